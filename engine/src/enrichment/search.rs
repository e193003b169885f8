//! Internet search adapter
//!
//! Wraps one of two search providers (Google Custom Search or SerpAPI)
//! behind the [`SearchProvider`] trait, with a per-process response cache.
//! Provider failures and missing credentials degrade to an empty result set
//! with a warning; callers never see an error.
//!
//! The cache is keyed on normalized query + result count and never expires;
//! it is cleared only by an explicit [`SearchService::clear_cache`]. This is
//! deliberately simpler than the TTL-swept conversation memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{Credentials, SearchConfig};

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
}

/// Errors internal to a provider call; absorbed by [`SearchService`]
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// A search backend. Implementations are stateless request/response
/// wrappers around one provider's REST API.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name, used as the `source` field on results
    fn name(&self) -> &str;

    /// Run one query against the provider
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// Google Custom Search provider
pub struct GoogleSearch {
    base_url: String,
    api_key: String,
    engine_id: String,
    client: reqwest::Client,
}

impl GoogleSearch {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    fn name(&self) -> &str {
        "Google"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        // Google caps a single page at 10 results
        let num = max_results.min(10).to_string();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Provider(format!("{}: {}", status, text)));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        let items = data
            .get("items")
            .and_then(|i| i.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(items
            .iter()
            .map(|item| SearchResult {
                title: item["title"].as_str().unwrap_or_default().to_string(),
                url: item["link"].as_str().unwrap_or_default().to_string(),
                snippet: item["snippet"].as_str().unwrap_or_default().to_string(),
                source: self.name().to_string(),
            })
            .collect())
    }
}

/// SerpAPI provider
pub struct SerpApiSearch {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SerpApiSearch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "SerpAPI"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let num = max_results.to_string();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Provider(format!("{}: {}", status, text)));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        let results = data
            .get("organic_results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(results
            .iter()
            .take(max_results)
            .map(|result| SearchResult {
                title: result["title"].as_str().unwrap_or_default().to_string(),
                url: result["link"].as_str().unwrap_or_default().to_string(),
                snippet: result["snippet"].as_str().unwrap_or_default().to_string(),
                source: self.name().to_string(),
            })
            .collect())
    }
}

/// Search service: provider selection, caching, graceful degradation
pub struct SearchService {
    provider: Option<Box<dyn SearchProvider>>,
    default_max_results: usize,
    cache: RwLock<HashMap<String, Vec<SearchResult>>>,
}

impl SearchService {
    /// Build the service from config and resolved credentials.
    ///
    /// An incompletely-credentialed provider leaves the service in degraded
    /// mode: every query returns empty with a warning.
    pub fn from_config(config: &SearchConfig, credentials: &Credentials) -> Self {
        let provider: Option<Box<dyn SearchProvider>> = match config.provider.as_str() {
            "google" => match (&credentials.search_api_key, &credentials.search_engine_id) {
                (Some(key), Some(engine_id)) => Some(Box::new(GoogleSearch::new(
                    &config.google_base_url,
                    key,
                    engine_id,
                ))),
                _ => {
                    warn!("Google search selected but SEARCH_API_KEY or SEARCH_ENGINE_ID is missing");
                    None
                }
            },
            "serpapi" => match &credentials.search_api_key {
                Some(key) => Some(Box::new(SerpApiSearch::new(&config.serpapi_base_url, key))),
                None => {
                    warn!("SerpAPI selected but SEARCH_API_KEY is missing");
                    None
                }
            },
            other => {
                warn!("Unknown search provider '{}'", other);
                None
            }
        };

        Self {
            provider,
            default_max_results: config.max_results,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Build a service around an explicit provider (used by tests)
    pub fn with_provider(provider: Box<dyn SearchProvider>, default_max_results: usize) -> Self {
        Self {
            provider: Some(provider),
            default_max_results,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// True when a fully-credentialed provider is configured
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Run a search. Never fails: cache hit, provider result, or empty.
    pub async fn search(&self, query: &str, max_results: Option<usize>) -> Vec<SearchResult> {
        let limit = max_results.unwrap_or(self.default_max_results);
        let key = cache_key(query, limit);

        {
            let cache = self.cache.read().expect("search cache lock poisoned");
            if let Some(results) = cache.get(&key) {
                debug!("Search cache hit for query: {}", query);
                return results.clone();
            }
        }

        let provider = match &self.provider {
            Some(p) => p,
            None => {
                warn!("No search provider configured, returning empty results");
                return Vec::new();
            }
        };

        match provider.search(query, limit).await {
            Ok(results) => {
                let mut cache = self.cache.write().expect("search cache lock poisoned");
                cache.insert(key, results.clone());
                results
            }
            Err(e) => {
                warn!("Search failed for query \"{}\": {}", query, e);
                Vec::new()
            }
        }
    }

    /// Render the top results as a numbered digest for instruction text
    pub async fn relevant_info(&self, query: &str, max_results: Option<usize>) -> String {
        let results = self.search(query, max_results).await;

        if results.is_empty() {
            return "No search results found.".to_string();
        }

        let lines = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}: {}", i + 1, r.title, r.snippet))
            .collect::<Vec<_>>()
            .join("\n");

        format!("Search results for \"{}\":\n{}", query, lines)
    }

    /// Drop every cached response
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .expect("search cache lock poisoned")
            .clear();
        debug!("Search cache cleared");
    }

    /// Cache entry count and keys, for the status endpoint
    pub fn cache_stats(&self) -> (usize, Vec<String>) {
        let cache = self.cache.read().expect("search cache lock poisoned");
        (cache.len(), cache.keys().cloned().collect())
    }
}

/// Cache key: normalized query + result count
fn cache_key(query: &str, max_results: usize) -> String {
    format!("{}::{}", query.trim().to_lowercase(), max_results)
}
