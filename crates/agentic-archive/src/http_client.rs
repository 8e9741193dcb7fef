//! Async HTTP client for the snapshot service, wrapping reqwest.
//!
//! Follows redirects and reports the final URL, rotates the user-agent per
//! request, and applies a bounded timeout. Retrying is left to the stages.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

use crate::config::UpstreamConfig;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Maximum redirect hops followed per request.
const MAX_REDIRECTS: usize = 10;

/// Response from an upstream request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client shared by the submitter and the fetcher.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    user_agents: Vec<String>,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a client with the given timeout and identity pool.
    pub fn new(timeout: Duration, user_agents: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            user_agents,
            timeout,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(config.timeout(), config.user_agents.clone())
    }

    /// Pick an identity header for the next attempt.
    pub fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or("Mozilla/5.0")
    }

    /// GET a page, following redirects.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let r = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header("DNT", "1")
            .timeout(self.timeout)
            .send()
            .await?;
        Self::collect(url, r).await
    }

    /// POST url-encoded form fields, following redirects.
    pub async fn post_form(
        &self,
        url: &str,
        form_fields: &[(&str, &str)],
    ) -> Result<HttpResponse, reqwest::Error> {
        let r = self
            .client
            .post(url)
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header("DNT", "1")
            .form(form_fields)
            .timeout(self.timeout)
            .send()
            .await?;
        Self::collect(url, r).await
    }

    /// HEAD a URL and return its status code.
    pub async fn head(&self, url: &str) -> Result<u16, reqwest::Error> {
        let r = self
            .client
            .head(url)
            .header(USER_AGENT, self.pick_user_agent())
            .timeout(self.timeout)
            .send()
            .await?;
        Ok(r.status().as_u16())
    }

    async fn collect(url: &str, r: reqwest::Response) -> Result<HttpResponse, reqwest::Error> {
        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let body = r.bytes().await?.to_vec();

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            body,
        })
    }
}

/// Short description of a transport failure for retry bookkeeping.
pub fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timeout: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else if err.is_redirect() {
        format!("redirect loop: {err}")
    } else {
        format!("transport error: {err}")
    }
}
