//! Domain availability adapter
//!
//! Checks whether a domain can be registered. A registrar availability API
//! is tried first, then a WHOIS lookup; when neither can answer (provider
//! failure or missing credentials) the adapter fails closed — it reports the
//! domain as registered rather than ever claiming availability it cannot
//! verify.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Credentials, DomainConfig};

/// Result of a domain availability check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainInfo {
    pub domain: String,
    pub available: bool,
    pub registered: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
}

impl DomainInfo {
    /// The conservative answer used whenever no provider can be trusted
    fn fail_closed(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            available: false,
            registered: true,
            registrar: Some("Unknown".to_string()),
            expiration_date: None,
        }
    }
}

/// Domain lookup service with registrar-then-WHOIS fallback
pub struct DomainService {
    client: reqwest::Client,
    registrar_base_url: String,
    whois_base_url: String,
    registrar_credentials: Option<(String, String)>,
    whois_api_key: Option<String>,
}

impl DomainService {
    /// Build the service from config and resolved credentials
    pub fn from_config(config: &DomainConfig, credentials: &Credentials) -> Self {
        let registrar_credentials = match (
            &credentials.registrar_api_key,
            &credentials.registrar_api_secret,
        ) {
            (Some(key), Some(secret)) => Some((key.clone(), secret.clone())),
            _ => None,
        };

        Self {
            client: reqwest::Client::new(),
            registrar_base_url: config.registrar_base_url.clone(),
            whois_base_url: config.whois_base_url.clone(),
            registrar_credentials,
            whois_api_key: credentials.whois_api_key.clone(),
        }
    }

    /// True when at least one lookup provider is credentialed
    pub fn is_configured(&self) -> bool {
        self.registrar_credentials.is_some() || self.whois_api_key.is_some()
    }

    /// Check whether a domain is available for registration.
    ///
    /// Never fails; the worst case is the fail-closed default.
    pub async fn check(&self, domain: &str) -> DomainInfo {
        let normalized = normalize_domain(domain);

        if let Some(info) = self.check_registrar(&normalized).await {
            return info;
        }

        self.check_whois(&normalized).await
    }

    /// Registrar availability API. `None` means "could not answer" and the
    /// caller falls through to WHOIS.
    async fn check_registrar(&self, domain: &str) -> Option<DomainInfo> {
        let (key, secret) = self.registrar_credentials.as_ref()?;

        let url = format!("{}/v1/domains/available/{}", self.registrar_base_url, domain);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("sso-key {}:{}", key, secret))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(
                "Registrar availability check for {} returned {}",
                domain,
                response.status()
            );
            return None;
        }

        let data: serde_json::Value = response.json().await.ok()?;
        let available = data.get("available")?.as_bool()?;

        Some(DomainInfo {
            domain: domain.to_string(),
            available,
            registered: !available,
            registrar: Some("GoDaddy".to_string()),
            expiration_date: None,
        })
    }

    /// WHOIS lookup. Any failure or missing credential yields the
    /// fail-closed default.
    async fn check_whois(&self, domain: &str) -> DomainInfo {
        let api_key = match &self.whois_api_key {
            Some(key) => key,
            None => {
                warn!("No WHOIS credential configured, failing closed for {}", domain);
                return DomainInfo::fail_closed(domain);
            }
        };

        let response = self
            .client
            .get(&self.whois_base_url)
            .query(&[("apiKey", api_key.as_str()), ("domainName", domain)])
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("WHOIS lookup for {} returned {}", domain, r.status());
                return DomainInfo::fail_closed(domain);
            }
            Err(e) => {
                warn!("WHOIS lookup failed for {}: {}", domain, e);
                return DomainInfo::fail_closed(domain);
            }
        };

        let data: serde_json::Value = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                warn!("WHOIS payload for {} unreadable: {}", domain, e);
                return DomainInfo::fail_closed(domain);
            }
        };

        let result = match data.get("result") {
            Some(r) => r,
            None => {
                warn!("WHOIS returned unexpected payload for {}", domain);
                return DomainInfo::fail_closed(domain);
            }
        };

        let registrar = result.get("registrar").and_then(|r| r.as_str());
        let available = registrar == Some("Not found");

        DomainInfo {
            domain: domain.to_string(),
            available,
            registered: !available,
            registrar: registrar.map(String::from),
            expiration_date: result
                .get("expirationDate")
                .and_then(|d| d.as_str())
                .map(String::from),
        }
    }

    /// Candidate domain names for a keyword, filtered to available ones.
    ///
    /// At most 10 candidates are checked and at most 5 returned.
    pub async fn suggestions(&self, keyword: &str) -> Vec<String> {
        let keyword = keyword.trim().to_lowercase();
        let mut candidates: Vec<String> = ["com", "net", "io", "app"]
            .iter()
            .map(|ext| format!("{}.{}", keyword, ext))
            .collect();
        candidates.extend([
            format!("{}online.com", keyword),
            format!("{}pro.com", keyword),
            format!("get{}.com", keyword),
            format!("the{}.com", keyword),
        ]);

        let mut available = Vec::new();
        for candidate in candidates.into_iter().take(10) {
            if self.check(&candidate).await.available {
                available.push(candidate);
                if available.len() == 5 {
                    break;
                }
            }
        }

        available
    }

    /// Caller-facing one-line summary of a domain's status
    pub async fn summary(&self, domain: &str) -> String {
        let info = self.check(domain).await;

        if info.available {
            format!("Domain {} is available for registration.", info.domain)
        } else {
            let registrar = info.registrar.as_deref().unwrap_or("unknown registrar");
            match info.expiration_date {
                Some(expires) => format!(
                    "Domain {} is already registered by {} and expires on {}.",
                    info.domain, registrar, expires
                ),
                None => format!(
                    "Domain {} is already registered by {}.",
                    info.domain, registrar
                ),
            }
        }
    }
}

/// Normalize a domain: lowercase, no scheme, no leading www, no trailing slash
pub fn normalize_domain(domain: &str) -> String {
    let mut d = domain.trim().to_lowercase();
    loop {
        let before = d.len();
        for prefix in ["https://", "http://", "www."] {
            if let Some(rest) = d.strip_prefix(prefix) {
                d = rest.to_string();
            }
        }
        if d.len() == before {
            break;
        }
    }
    d.trim_end_matches('/').to_string()
}
