//! Cache keys for reference data fetched through the bridge.

use sha2::{Digest, Sha256};

use crate::cache::QueryKey;

/// Slow-changing reference data cached per Jira instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceData {
  IssueTypes,
  SubtaskIssueTypes,
  Priorities,
  Statuses,
  Resolutions,
  Filters,
  Projects,
}

impl ReferenceData {
  pub fn name(&self) -> &'static str {
    match self {
      Self::IssueTypes => "issue_types",
      Self::SubtaskIssueTypes => "subtasks_issue_types",
      Self::Priorities => "priorities",
      Self::Statuses => "status",
      Self::Resolutions => "resolutions",
      Self::Filters => "filters",
      Self::Projects => "projects",
    }
  }
}

/// A reference data key scoped to one Jira instance.
#[derive(Clone, Debug)]
pub struct CachedCall {
  pub base_url: String,
  pub data: ReferenceData,
}

impl CachedCall {
  pub fn new(base_url: &str, data: ReferenceData) -> Self {
    Self {
      base_url: base_url.to_string(),
      data,
    }
  }
}

impl QueryKey for CachedCall {
  fn cache_hash(&self) -> String {
    let input = format!("{}:{}", normalize_url(&self.base_url), self.data.name());

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    format!("{} @ {}", self.data.name(), self.base_url)
  }
}

fn normalize_url(url: &str) -> String {
  url.trim().trim_end_matches('/').to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hash_is_stable_across_url_spelling() {
    let a = CachedCall::new("https://jira.example.com/", ReferenceData::Priorities);
    let b = CachedCall::new("https://JIRA.example.com", ReferenceData::Priorities);
    assert_eq!(a.cache_hash(), b.cache_hash());
    assert_eq!(a.cache_hash().len(), 64);
  }

  #[test]
  fn test_hash_differs_per_method_and_instance() {
    let priorities = CachedCall::new("https://jira.example.com", ReferenceData::Priorities);
    let statuses = CachedCall::new("https://jira.example.com", ReferenceData::Statuses);
    let other = CachedCall::new("https://other.example.com", ReferenceData::Priorities);
    assert_ne!(priorities.cache_hash(), statuses.cache_hash());
    assert_ne!(priorities.cache_hash(), other.cache_hash());
  }

  #[test]
  fn test_description() {
    let key = CachedCall::new("https://jira.example.com", ReferenceData::SubtaskIssueTypes);
    assert_eq!(key.description(), "subtasks_issue_types @ https://jira.example.com");
  }
}
