//! Classify command: show how a tag would be treated.

use serde::Serialize;

use crate::tag::TagRules;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifyReport {
    pub tag: String,
    pub version: Option<String>,
    pub matches_release: bool,
    pub is_pre_release: bool,
    pub is_forced: bool,
    pub should_promote: bool,
}

#[derive(Debug)]
pub struct ClassifyCommand {
    rules: TagRules,
}

impl ClassifyCommand {
    pub fn new(rules: TagRules) -> Self {
        Self { rules }
    }

    pub fn execute(&self, tag: &str) -> ClassifyReport {
        let parsed = self.rules.parse(tag);
        let classification = parsed.classification();
        ClassifyReport {
            version: parsed.version.as_ref().map(ToString::to_string),
            matches_release: parsed.matches_release,
            is_pre_release: parsed.is_pre_release,
            is_forced: classification.is_forced,
            should_promote: classification.should_promote,
            tag: parsed.raw,
        }
    }
}
