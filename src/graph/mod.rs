pub mod auth;
pub mod csom;
pub mod entra;
pub mod spo;

use crate::error::{M365Error, Result};
use auth::TokenProvider;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const GRAPH_URL: &str = "https://graph.microsoft.com";

const GRAPH_ACCEPT: &str = "application/json;odata.metadata=none";
const SPO_ACCEPT: &str = "application/json;odata=nometadata";

const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Retry schedule for throttled and transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30000),
        }
    }
}

impl RetryPolicy {
    /// Retries without waiting, for tests against local mock servers
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Exponential backoff with jitter for `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial = self.initial_backoff.as_millis() as u64;
        if initial == 0 {
            return Duration::ZERO;
        }

        let base_backoff = initial.saturating_mul(2u64.saturating_pow(attempt));
        let capped_backoff = base_backoff.min(self.max_backoff.as_millis() as u64);

        let jitter_range = (capped_backoff as f64 * JITTER_FACTOR) as u64;
        let jitter = if jitter_range > 0 {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::time::SystemTime::now().hash(&mut hasher);
            (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
        } else {
            0
        };

        Duration::from_millis((capped_backoff as i64 + jitter).max(100) as u64)
    }
}

/// Request body variants
enum Payload<'a> {
    Empty,
    Json(&'a Value),
    Text {
        content: &'a str,
        content_type: &'a str,
    },
}

/// Generic paginated response
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// HTTP client for Microsoft Graph and SharePoint with auth and retry
#[derive(Clone)]
pub struct RequestClient {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
}

impl RequestClient {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_retry(tokens, RetryPolicy::default())
    }

    pub fn with_retry(tokens: Arc<dyn TokenProvider>, retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .user_agent(concat!("m365-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            tokens,
            retry,
        }
    }

    /// Access token for the resource serving `url`
    pub async fn access_token(&self, url: &str) -> Result<String> {
        self.tokens.access_token(&resource_of(url)?).await
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.send(Method::GET, url, Payload::Empty, &[]).await?;
        parse_body(&text)
    }

    pub async fn post<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        let text = self.send(Method::POST, url, Payload::Json(body), &[]).await?;
        parse_body(&text)
    }

    /// POST without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.send(Method::POST, url, Payload::Empty, &[]).await?;
        parse_body(&text)
    }

    pub async fn patch<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        let text = self.send(Method::PATCH, url, Payload::Json(body), &[]).await?;
        parse_body(&text)
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        self.send(Method::DELETE, url, Payload::Empty, &[]).await?;
        Ok(())
    }

    /// POST a raw body, returning the raw response text (CSOM)
    pub async fn post_text(
        &self,
        url: &str,
        content: &str,
        content_type: &str,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        self.send(
            Method::POST,
            url,
            Payload::Text {
                content,
                content_type,
            },
            headers,
        )
        .await
    }

    /// Fetch all pages of a collection by following `@odata.nextLink`
    pub async fn get_all_items<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current_url = url.to_string();

        loop {
            let page: PaginatedResponse<T> = self.get(&current_url).await?;
            all_items.extend(page.value);

            match page.next_link {
                Some(next) => current_url = next,
                None => break,
            }
        }

        Ok(all_items)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        payload: Payload<'_>,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        let token = self.access_token(url).await?;
        let accept = if is_sharepoint_api(url) {
            SPO_ACCEPT
        } else {
            GRAPH_ACCEPT
        };

        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&token)
                .header(ACCEPT, accept);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request = match &payload {
                Payload::Empty => request,
                Payload::Json(body) => request.json(body),
                Payload::Text {
                    content,
                    content_type,
                } => request
                    .header(CONTENT_TYPE, *content_type)
                    .body(content.to_string()),
            };

            debug!("{} {}", method, url);
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if (status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                        && attempt < self.retry.max_retries
                    {
                        let wait_time = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                            retry_after(resp.headers())
                                .unwrap_or_else(|| self.retry.backoff(attempt))
                        } else {
                            self.retry.backoff(attempt)
                        };
                        warn!(
                            "{} returned {}. Retrying in {:?}... (attempt {}/{})",
                            url,
                            status,
                            wait_time,
                            attempt + 1,
                            self.retry.max_retries
                        );
                        tokio::time::sleep(wait_time).await;
                        attempt += 1;
                        continue;
                    }

                    let text = resp.text().await?;
                    debug!("{} {} -> {}", method, url, status);

                    if !status.is_success() {
                        return Err(M365Error::from_response(status.as_u16(), &text));
                    }

                    return Ok(text);
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.retry.max_retries => {
                    let wait_time = self.retry.backoff(attempt);
                    warn!(
                        "Connection error: {}. Retrying in {:?}... (attempt {}/{})",
                        e,
                        wait_time,
                        attempt + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(wait_time).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Empty bodies (204, or a bare 200) read as JSON null
fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T> {
    if text.trim().is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_str(text)?)
}

fn is_sharepoint_api(url: &str) -> bool {
    url.contains("/_api/") || url.contains("/_vti_bin/")
}

/// Scheme and authority of `url`; tokens are issued per resource
pub fn resource_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| M365Error::CommandError(format!("Invalid URL '{}': {}", url, e)))?;
    Ok(parsed.origin().ascii_serialization())
}
