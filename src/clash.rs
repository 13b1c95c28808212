//! Clash control API client
//!
//! Thin wrapper around the daemon's HTTP control endpoints. Every call
//! converts failure into a bool/Option sentinel at the boundary; nothing in
//! here returns an error to the caller.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Fallback local proxy port when the daemon reports none
const DEFAULT_PORT: u16 = 7890;

/// Timeout applied to mode/switch mutation calls
const MUTATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Relevant slice of the daemon's `/configs` document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(rename = "mixed-port", default)]
    pub mixed_port: u16,
    #[serde(default)]
    pub port: u16,
    #[serde(rename = "socks-port", default)]
    pub socks_port: u16,
}

impl DaemonConfig {
    /// First non-zero listening port in preference order:
    /// mixed port, then HTTP port, then SOCKS port
    pub fn preferred_port(&self) -> Option<u16> {
        [self.mixed_port, self.port, self.socks_port]
            .into_iter()
            .find(|&p| p != 0)
    }
}

#[derive(Debug, Deserialize)]
struct ProxiesResponse {
    #[serde(default)]
    proxies: serde_json::Map<String, serde_json::Value>,
}

/// Percent-encode a selector group name for use in a `/proxies/<name>` path
fn encode_selector(selector: &str) -> String {
    utf8_percent_encode(selector, NON_ALPHANUMERIC).to_string()
}

/// Client for the Clash control API
pub struct ClashController {
    api_url: String,
    secret: String,
    client: Client,
}

impl ClashController {
    pub fn new(api_url: &str, secret: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
            client: Client::new(),
        }
    }

    /// Set the daemon routing mode (global, rule, direct); true on success
    pub async fn set_mode(&self, mode: &str) -> bool {
        let url = format!("{}/configs", self.api_url);
        let result = self
            .client
            .patch(&url)
            .bearer_auth(&self.secret)
            .timeout(MUTATION_TIMEOUT)
            .json(&serde_json::json!({ "mode": mode }))
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::NO_CONTENT => {
                println!("Successfully set mode to: {}", mode);
                true
            }
            Ok(response) => {
                println!("Failed to set mode. Status: {}", response.status());
                false
            }
            Err(e) => {
                println!("API Error setting mode: {}", e);
                false
            }
        }
    }

    /// Point the named selector group at the named node; true on success
    pub async fn switch_proxy(&self, selector: &str, proxy_name: &str) -> bool {
        let url = format!("{}/proxies/{}", self.api_url, encode_selector(selector));
        let result = self
            .client
            .put(&url)
            .bearer_auth(&self.secret)
            .timeout(MUTATION_TIMEOUT)
            .json(&serde_json::json!({ "name": proxy_name }))
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::NO_CONTENT => true,
            Ok(response) => {
                println!(
                    "Failed to switch to {}. Status: {}",
                    proxy_name,
                    response.status()
                );
                false
            }
            Err(e) => {
                println!("API Error switching to {}: {}", proxy_name, e);
                false
            }
        }
    }

    /// Discover the port the daemon is actually listening on
    ///
    /// Never fails; any trouble degrades to the 7890 default.
    pub async fn get_running_port(&self) -> u16 {
        match self.fetch_config().await {
            Some(config) => config.preferred_port().unwrap_or(DEFAULT_PORT),
            None => DEFAULT_PORT,
        }
    }

    /// Fetch the daemon's full proxy map, or `None` on failure
    pub async fn get_proxies(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        let url = format!("{}/proxies", self.api_url);
        let response = match self.client.get(&url).bearer_auth(&self.secret).send().await {
            Ok(r) => r,
            Err(e) => {
                println!("Error fetching proxies: {}", e);
                return None;
            }
        };
        if response.status() != StatusCode::OK {
            println!("Error fetching proxies: status {}", response.status());
            return None;
        }
        match response.json::<ProxiesResponse>().await {
            Ok(body) => Some(body.proxies),
            Err(e) => {
                println!("Error parsing proxies: {}", e);
                None
            }
        }
    }

    async fn fetch_config(&self) -> Option<DaemonConfig> {
        let url = format!("{}/configs", self.api_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret)
            .send()
            .await
            .ok()?;
        if response.status() != StatusCode::OK {
            return None;
        }
        response.json().await.ok()
    }
}
