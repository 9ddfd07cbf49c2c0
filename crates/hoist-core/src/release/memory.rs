//! In-memory release host.
//!
//! Holds releases and asset bytes in a mutex-guarded map and can be told to
//! fail specific downloads or uploads, which is how the pipeline's retry and
//! partial-publish paths are exercised without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{HostError, ReleaseFilter, ReleaseHandle, ReleaseHost, ReleaseRecord};

#[derive(Debug, Clone)]
struct StoredRelease {
    id: u64,
    tag: String,
    created_at: DateTime<Utc>,
    prerelease: bool,
    draft: bool,
    assets: Vec<(String, Vec<u8>)>,
}

impl StoredRelease {
    fn record(&self) -> ReleaseRecord {
        ReleaseRecord {
            tag: self.tag.clone(),
            created_at: self.created_at,
            prerelease: self.prerelease,
            draft: self.draft,
            assets: self.asset_names(),
        }
    }

    fn asset_names(&self) -> Vec<String> {
        self.assets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn handle(&self, created: bool) -> ReleaseHandle {
        ReleaseHandle {
            id: self.id,
            tag: self.tag.clone(),
            draft: self.draft,
            prerelease: self.prerelease,
            assets: self.asset_names(),
            created,
            upload_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Fail this many more times with a transient error, then succeed
    Transient(u32),
    /// Always fail with a permanent error
    Permanent,
}

#[derive(Debug, Default)]
struct State {
    releases: Vec<StoredRelease>,
    next_id: u64,
    download_faults: HashMap<String, Fault>,
    upload_faults: HashMap<String, Fault>,
    fail_create: bool,
    downloads: BTreeMap<String, u32>,
    uploads: BTreeMap<String, u32>,
}

impl State {
    fn find(&self, tag: &str) -> Option<&StoredRelease> {
        self.releases.iter().find(|r| r.tag == tag)
    }

    fn find_mut(&mut self, tag: &str) -> Option<&mut StoredRelease> {
        self.releases.iter_mut().find(|r| r.tag == tag)
    }
}

/// Consume one occurrence of a fault registered for `name`.
fn trip(faults: &mut HashMap<String, Fault>, name: &str) -> Option<HostError> {
    match faults.get_mut(name)? {
        Fault::Permanent => Some(HostError::Status {
            status: 403,
            url: format!("memory://{}", name),
        }),
        Fault::Transient(0) => None,
        Fault::Transient(remaining) => {
            *remaining -= 1;
            Some(HostError::Status {
                status: 503,
                url: format!("memory://{}", name),
            })
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a release record. Replaces nothing; tags are expected to be unique.
    pub fn add_release(&self, tag: &str, created_at: DateTime<Utc>, prerelease: bool, draft: bool) {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.releases.push(StoredRelease {
            id,
            tag: tag.to_string(),
            created_at,
            prerelease,
            draft,
            assets: Vec::new(),
        });
    }

    /// Attach an asset to an existing release.
    pub fn add_asset(&self, tag: &str, name: &str, bytes: Vec<u8>) {
        let mut state = self.state();
        if let Some(release) = state.find_mut(tag) {
            release.assets.push((name.to_string(), bytes));
        }
    }

    pub fn fail_download(&self, asset: &str, times: u32) {
        self.state()
            .download_faults
            .insert(asset.to_string(), Fault::Transient(times));
    }

    pub fn fail_download_always(&self, asset: &str) {
        self.state()
            .download_faults
            .insert(asset.to_string(), Fault::Permanent);
    }

    pub fn fail_upload(&self, asset: &str, times: u32) {
        self.state()
            .upload_faults
            .insert(asset.to_string(), Fault::Transient(times));
    }

    pub fn fail_upload_always(&self, asset: &str) {
        self.state()
            .upload_faults
            .insert(asset.to_string(), Fault::Permanent);
    }

    pub fn fail_create(&self) {
        self.state().fail_create = true;
    }

    /// Remove every injected download and upload fault.
    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.download_faults.clear();
        state.upload_faults.clear();
        state.fail_create = false;
    }

    pub fn release(&self, tag: &str) -> Option<ReleaseRecord> {
        self.state().find(tag).map(StoredRelease::record)
    }

    pub fn asset_bytes(&self, tag: &str, asset: &str) -> Option<Vec<u8>> {
        self.state()
            .find(tag)?
            .assets
            .iter()
            .find(|(name, _)| name == asset)
            .map(|(_, bytes)| bytes.clone())
    }

    /// Download attempts made for `asset`, including failed ones.
    pub fn download_attempts(&self, asset: &str) -> u32 {
        self.state().downloads.get(asset).copied().unwrap_or(0)
    }

    /// Upload attempts made across all assets, including failed ones.
    pub fn total_upload_attempts(&self) -> u32 {
        self.state().uploads.values().sum()
    }

    pub fn upload_attempts(&self, asset: &str) -> u32 {
        self.state().uploads.get(asset).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ReleaseHost for MemoryHost {
    async fn list_releases(&self, filter: ReleaseFilter) -> Result<Vec<ReleaseRecord>, HostError> {
        Ok(self
            .state()
            .releases
            .iter()
            .map(StoredRelease::record)
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn release_assets(&self, tag: &str) -> Result<Vec<String>, HostError> {
        self.state()
            .find(tag)
            .map(StoredRelease::asset_names)
            .ok_or_else(|| HostError::NotFound(format!("release {}", tag)))
    }

    async fn download_asset(&self, tag: &str, asset: &str) -> Result<Vec<u8>, HostError> {
        let mut state = self.state();
        *state.downloads.entry(asset.to_string()).or_default() += 1;
        if let Some(err) = trip(&mut state.download_faults, asset) {
            return Err(err);
        }
        state
            .find(tag)
            .and_then(|r| r.assets.iter().find(|(name, _)| name == asset))
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| HostError::NotFound(format!("asset {} on release {}", asset, tag)))
    }

    async fn create_or_get_release(
        &self,
        tag: &str,
        draft: bool,
        prerelease: bool,
    ) -> Result<ReleaseHandle, HostError> {
        let mut state = self.state();
        if let Some(existing) = state.find(tag) {
            return Ok(existing.handle(false));
        }
        if state.fail_create {
            return Err(HostError::Status {
                status: 422,
                url: format!("memory://releases/{}", tag),
            });
        }
        state.next_id += 1;
        let release = StoredRelease {
            id: state.next_id,
            tag: tag.to_string(),
            created_at: Utc::now(),
            prerelease,
            draft,
            assets: Vec::new(),
        };
        let handle = release.handle(true);
        state.releases.push(release);
        Ok(handle)
    }

    async fn upload_asset(
        &self,
        release: &ReleaseHandle,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        *state.uploads.entry(name.to_string()).or_default() += 1;
        if let Some(err) = trip(&mut state.upload_faults, name) {
            return Err(err);
        }
        let stored = state
            .releases
            .iter_mut()
            .find(|r| r.id == release.id)
            .ok_or_else(|| HostError::NotFound(format!("release {}", release.tag)))?;
        if stored.assets.iter().any(|(existing, _)| existing == name) {
            return Err(HostError::Status {
                status: 422,
                url: format!("memory://releases/{}/assets/{}", release.tag, name),
            });
        }
        stored.assets.push((name.to_string(), bytes));
        Ok(())
    }

    async fn delete_release(&self, release: &ReleaseHandle) -> Result<(), HostError> {
        let mut state = self.state();
        let before = state.releases.len();
        state.releases.retain(|r| r.id != release.id);
        if state.releases.len() == before {
            return Err(HostError::NotFound(format!("release {}", release.tag)));
        }
        Ok(())
    }
}
