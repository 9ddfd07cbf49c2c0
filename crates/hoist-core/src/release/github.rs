//! GitHub releases over the REST API.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{HostError, ReleaseFilter, ReleaseHandle, ReleaseHost, ReleaseRecord};
use crate::config::RepositoryConfig;

const PER_PAGE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
struct GhRelease {
    id: u64,
    tag_name: String,
    draft: bool,
    prerelease: bool,
    created_at: DateTime<Utc>,
    upload_url: String,
    #[serde(default)]
    assets: Vec<GhAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct GhAsset {
    id: u64,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateRelease<'a> {
    tag_name: &'a str,
    name: &'a str,
    draft: bool,
    prerelease: bool,
}

impl GhRelease {
    fn record(&self) -> ReleaseRecord {
        ReleaseRecord {
            tag: self.tag_name.clone(),
            created_at: self.created_at,
            prerelease: self.prerelease,
            draft: self.draft,
            assets: self.assets.iter().map(|a| a.name.clone()).collect(),
        }
    }

    fn handle(&self, created: bool) -> ReleaseHandle {
        ReleaseHandle {
            id: self.id,
            tag: self.tag_name.clone(),
            draft: self.draft,
            prerelease: self.prerelease,
            assets: self.assets.iter().map(|a| a.name.clone()).collect(),
            created,
            upload_url: Some(self.upload_url.clone()),
        }
    }
}

/// Release host backed by a GitHub repository.
///
/// Releases are always listed rather than looked up by tag because the
/// by-tag endpoint does not return drafts.
#[derive(Debug)]
pub struct GitHubHost {
    client: reqwest::Client,
    api_url: Url,
    owner: String,
    repo: String,
    cache: Mutex<HashMap<String, GhRelease>>,
}

impl GitHubHost {
    /// Build a host for `repository`, authenticating with `token` when given.
    pub fn new(repository: &RepositoryConfig, token: Option<String>) -> anyhow::Result<Self> {
        let (owner, repo) = repository.owner_and_name()?;
        let api_url = Url::parse(&repository.api_url)
            .with_context(|| format!("Invalid GitHub API URL: {}", repository.api_url))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GitHub token contains invalid header characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("hoist/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url,
            owner: owner.to_string(),
            repo: repo.to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            self.owner,
            self.repo,
            path
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, HostError> {
        let response = request.send().await.map_err(|e| HostError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(HostError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(HostError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<T, HostError> {
        response.json().await.map_err(|e| HostError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Fetch every release of the repository and refresh the tag cache.
    async fn refresh(&self) -> Result<Vec<GhRelease>, HostError> {
        let url = self.repo_url("releases");
        let mut releases = Vec::new();
        let mut page = 1;
        loop {
            let request = self.client.get(&url).query(&[
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ]);
            let response = self.send(request, &url).await?;
            let batch: Vec<GhRelease> = Self::json(response, &url).await?;
            let done = batch.len() < PER_PAGE;
            releases.extend(batch);
            if done {
                break;
            }
            page += 1;
        }

        tracing::debug!(
            repo = %format!("{}/{}", self.owner, self.repo),
            count = releases.len(),
            "listed releases"
        );

        let mut cache = self.lock_cache();
        cache.clear();
        for release in &releases {
            cache.insert(release.tag_name.clone(), release.clone());
        }
        Ok(releases)
    }

    async fn find(&self, tag: &str, fresh: bool) -> Result<GhRelease, HostError> {
        if !fresh {
            let cached = self.lock_cache().get(tag).cloned();
            if let Some(release) = cached {
                return Ok(release);
            }
        }
        self.refresh()
            .await?
            .into_iter()
            .find(|r| r.tag_name == tag)
            .ok_or_else(|| HostError::NotFound(format!("release {}", tag)))
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, GhRelease>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ReleaseHost for GitHubHost {
    async fn list_releases(&self, filter: ReleaseFilter) -> Result<Vec<ReleaseRecord>, HostError> {
        Ok(self
            .refresh()
            .await?
            .iter()
            .map(GhRelease::record)
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn release_assets(&self, tag: &str) -> Result<Vec<String>, HostError> {
        Ok(self.find(tag, true).await?.record().assets)
    }

    async fn download_asset(&self, tag: &str, asset: &str) -> Result<Vec<u8>, HostError> {
        let release = self.find(tag, false).await?;
        let id = release
            .assets
            .iter()
            .find(|a| a.name == asset)
            .map(|a| a.id)
            .ok_or_else(|| HostError::NotFound(format!("asset {} on release {}", asset, tag)))?;

        let url = self.repo_url(&format!("releases/assets/{}", id));
        let request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/octet-stream");
        let response = self.send(request, &url).await?;
        let bytes = response.bytes().await.map_err(|e| HostError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn create_or_get_release(
        &self,
        tag: &str,
        draft: bool,
        prerelease: bool,
    ) -> Result<ReleaseHandle, HostError> {
        match self.find(tag, true).await {
            Ok(existing) => return Ok(existing.handle(false)),
            Err(HostError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let url = self.repo_url("releases");
        let body = CreateRelease {
            tag_name: tag,
            name: tag,
            draft,
            prerelease,
        };
        let response = self.send(self.client.post(&url).json(&body), &url).await?;
        let created: GhRelease = Self::json(response, &url).await?;
        self.lock_cache()
            .insert(created.tag_name.clone(), created.clone());
        Ok(created.handle(true))
    }

    async fn upload_asset(
        &self,
        release: &ReleaseHandle,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), HostError> {
        // upload_url is an RFC 6570 template: ".../assets{?name,label}"
        let template = release
            .upload_url
            .as_deref()
            .ok_or_else(|| HostError::Other(format!("release {} has no upload URL", release.tag)))?;
        let url = template
            .split('{')
            .next()
            .unwrap_or(template)
            .to_string();

        let request = self
            .client
            .post(&url)
            .query(&[("name", name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        self.send(request, &url).await?;
        Ok(())
    }

    async fn delete_release(&self, release: &ReleaseHandle) -> Result<(), HostError> {
        let url = self.repo_url(&format!("releases/{}", release.id));
        self.send(self.client.delete(&url), &url).await?;
        self.lock_cache().remove(&release.tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> RepositoryConfig {
        RepositoryConfig {
            owner: Some("acme".to_string()),
            name: Some("node".to_string()),
            ..RepositoryConfig::default()
        }
    }

    #[test]
    fn builds_repo_urls() {
        let host = GitHubHost::new(&repository(), None).unwrap();
        assert_eq!(
            host.repo_url("releases"),
            "https://api.github.com/repos/acme/node/releases"
        );
    }

    #[test]
    fn trailing_slash_in_api_url_is_ignored() {
        let mut repo = repository();
        repo.api_url = "https://ghe.example.com/api/v3/".to_string();
        let host = GitHubHost::new(&repo, Some("token".to_string())).unwrap();
        assert_eq!(
            host.repo_url("releases/7"),
            "https://ghe.example.com/api/v3/repos/acme/node/releases/7"
        );
    }

    #[test]
    fn missing_repository_is_rejected() {
        assert!(GitHubHost::new(&RepositoryConfig::default(), None).is_err());
    }

    #[test]
    fn release_json_maps_to_record() {
        let json = r#"{
            "id": 42,
            "tag_name": "v1.2.0-pre3",
            "draft": false,
            "prerelease": true,
            "created_at": "2024-03-01T12:00:00Z",
            "upload_url": "https://uploads.github.com/repos/o/r/releases/42/assets{?name,label}",
            "assets": [{ "id": 7, "name": "v1.2.0-pre3-Linux-mainnet.tar.gz" }]
        }"#;
        let release: GhRelease = serde_json::from_str(json).unwrap();
        let record = release.record();
        assert_eq!(record.tag, "v1.2.0-pre3");
        assert!(record.prerelease);
        assert_eq!(record.assets, vec!["v1.2.0-pre3-Linux-mainnet.tar.gz"]);

        let handle = release.handle(false);
        assert_eq!(handle.id, 42);
        assert!(!handle.created);
    }
}
