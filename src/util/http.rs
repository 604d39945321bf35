//! Outbound GET seam shared by the catalog client, the detail enricher and the image relay.
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::error::PopulateError;
use crate::util::env::env_parse;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the body of a successful response.
    async fn get_bytes(&self, url: &str) -> Result<Bytes, PopulateError>;
}

/// GET `url` and decode a JSON body.
pub async fn fetch_json<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    url: &str,
) -> Result<T, PopulateError> {
    let body = fetcher.get_bytes(url).await?;
    serde_json::from_slice(&body).map_err(|e| PopulateError::malformed(url, e))
}

/// GET `url` and decode the body as (lossy) UTF-8 text.
pub async fn fetch_text(fetcher: &dyn Fetcher, url: &str) -> Result<String, PopulateError> {
    let body = fetcher.get_bytes(url).await?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

pub fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

/// [`Fetcher`] over a shared `reqwest::Client`, optionally spaced by a [`RequestThrottle`].
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    throttle: RequestThrottle,
}

impl ReqwestFetcher {
    pub fn new(client: Client, throttle: RequestThrottle) -> Self {
        Self { client, throttle }
    }

    pub fn unthrottled(client: Client) -> Self {
        Self::new(client, RequestThrottle::disabled())
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, PopulateError> {
        self.throttle.wait().await;
        debug!(url = %url, "http get");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PopulateError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error".to_string());
            return Err(PopulateError::status(url, status.as_u16(), &error_text));
        }

        response
            .bytes()
            .await
            .map_err(|e| PopulateError::network(url, e))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_ops_per_window: u32,
    pub window_secs: u64,
}

impl RateLimitSettings {
    pub fn from_env(max_key: &str, window_key: &str, default_max: u32, default_window: u64) -> Self {
        Self {
            max_ops_per_window: env_parse(max_key, default_max),
            window_secs: env_parse(window_key, default_window),
        }
    }

    /// Spacing between consecutive requests; `None` disables throttling.
    pub fn per_request_interval(&self) -> Option<Duration> {
        if self.max_ops_per_window == 0 || self.window_secs == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(
                self.window_secs as f64 / self.max_ops_per_window as f64,
            ))
        }
    }
}

/// Spaces requests so at most `max_ops_per_window` start per window. Clones share state.
#[derive(Clone, Debug)]
pub struct RequestThrottle {
    interval: Option<Duration>,
    state: Option<Arc<Mutex<Instant>>>,
}

impl RequestThrottle {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let interval = settings.per_request_interval();
        let state = interval.map(|_| Arc::new(Mutex::new(Instant::now())));
        Self { interval, state }
    }

    pub fn disabled() -> Self {
        Self {
            interval: None,
            state: None,
        }
    }

    pub async fn wait(&self) {
        let (Some(interval), Some(state)) = (self.interval, &self.state) else {
            return;
        };

        let mut next_allowed = state.lock().await;
        let now = Instant::now();
        let wait_until = if now >= *next_allowed {
            now
        } else {
            *next_allowed
        };
        let sleep_duration = wait_until.saturating_duration_since(now);
        *next_allowed = wait_until + interval;
        drop(next_allowed);

        if !sleep_duration.is_zero() {
            sleep(sleep_duration).await;
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! Canned-response fetcher for unit tests.
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    pub struct StaticFetcher {
        responses: StdMutex<HashMap<String, (u16, Bytes)>>,
        requested: StdMutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(self, url: &str, status: u16, body: impl Into<Bytes>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), (status, body.into()));
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn get_bytes(&self, url: &str) -> Result<Bytes, PopulateError> {
            self.requested.lock().unwrap().push(url.to_string());
            let canned = self.responses.lock().unwrap().get(url).cloned();
            match canned {
                Some((status, body)) if (200..300).contains(&status) => Ok(body),
                Some((status, body)) => Err(PopulateError::status(
                    url,
                    status,
                    &String::from_utf8_lossy(&body),
                )),
                None => Err(PopulateError::status(url, 404, "no canned response")),
            }
        }
    }
}
