use serde::{Deserialize, Serialize};

use super::options::DownloadConfig;

/// What a playlist download does when one entry fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    #[default]
    BestEffort,
    StopOnError
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaylistRequest {
    pub url: String,
    #[serde(default)]
    pub config: DownloadConfig,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default)]
    pub policy: ErrorPolicy,
    /// Entries downloaded at the same time. Sequential by default.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize
}

fn default_max_entries() -> usize {
    100
}

fn default_concurrency() -> usize {
    1
}

impl PlaylistRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: DownloadConfig::default(),
            max_entries: default_max_entries(),
            policy: ErrorPolicy::default(),
            concurrency: default_concurrency()
        }
    }

    pub fn config(mut self, config: DownloadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    YouTube,
    SoundCloud
}

impl SearchProvider {
    fn prefix(self) -> &'static str {
        match self {
            SearchProvider::YouTube => "ytsearch",
            SearchProvider::SoundCloud => "scsearch"
        }
    }
}

pub const MAX_SEARCH_RESULTS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub provider: SearchProvider
}

fn default_max_results() -> usize {
    10
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: default_max_results(),
            provider: SearchProvider::default()
        }
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn provider(mut self, provider: SearchProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Number of results actually requested from the tool.
    pub fn limit(&self) -> usize {
        self.max_results.clamp(1, MAX_SEARCH_RESULTS)
    }

    /// The pseudo-URL yt-dlp understands, e.g. `ytsearch5:rust async`.
    pub fn search_url(&self) -> String {
        format!("{}{}:{}", self.provider.prefix(), self.limit(), self.query.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url() {
        let request = SearchRequest::new(" rust async ").max_results(5);
        assert_eq!(request.search_url(), "ytsearch5:rust async");

        let request = SearchRequest::new("lofi")
            .provider(SearchProvider::SoundCloud)
            .max_results(500);
        assert_eq!(request.search_url(), "scsearch50:lofi");
    }

    #[test]
    fn test_playlist_request_defaults() {
        let request: PlaylistRequest =
            serde_json::from_str(r#"{"url": "https://example.com/list", "policy": "stop-on-error"}"#)
                .unwrap();
        assert_eq!(request.max_entries, 100);
        assert_eq!(request.concurrency, 1);
        assert_eq!(request.policy, ErrorPolicy::StopOnError);
        assert!(serde_json::from_str::<PlaylistRequest>(r#"{"url": "x", "parallel": true}"#).is_err());
    }
}
