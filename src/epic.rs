use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{error, info, info_span, instrument};

use crate::error::FetchError;
use crate::retry::{
    build_agent, classify_status, is_transient_transport, retry_after_header, Attempt, GiveUp, RetryPolicy,
    StatusClass,
};

pub const PROMOTIONS_URL: &str = "https://store-site-backend-static-ipv4.ak.epicgames.com/freeGamesPromotions";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// The endpoint serves a reduced page to unknown clients
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Client for the storefront's public free-games promotions endpoint.
#[derive(Clone)]
pub struct EpicStore {
    agent: ureq::Agent,
    endpoint: String,
    allow_countries: Option<String>,
    retry: RetryPolicy,
}

impl fmt::Debug for EpicStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpicStore")
            .field("endpoint", &self.endpoint)
            .field("allow_countries", &self.allow_countries)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl EpicStore {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            agent: build_agent(request_timeout),
            endpoint: endpoint.into(),
            allow_countries: None,
            retry,
        }
    }

    /// Override the `allowCountries` parameter, which otherwise mirrors `country`.
    pub fn with_allow_countries(mut self, allow_countries: impl Into<String>) -> Self {
        let allow_countries = allow_countries.into();
        self.allow_countries = (!allow_countries.is_empty()).then_some(allow_countries);
        self
    }

    /// GET the promotions payload for a locale and country.
    ///
    /// Timeouts, connection failures, 5xx and 429 are retried with backoff (429 honors
    /// `Retry-After`). Other statuses and undecodable bodies fail on the spot. No retry is
    /// started that would end past `deadline`.
    #[instrument(level = "info", skip(self, deadline), fields(endpoint = %self.endpoint))]
    pub fn fetch(&self, locale: &str, country: &str, deadline: Instant) -> Result<Value, FetchError> {
        let allow_countries = self.allow_countries.as_deref().unwrap_or(country);

        let outcome = self.retry.execute("storefront", deadline, |attempt| {
            let _span = info_span!("storefront_fetch", attempt).entered();
            let result = self
                .agent
                .get(&self.endpoint)
                .query("locale", locale)
                .query("country", country)
                .query("allowCountries", allow_countries)
                .header("User-Agent", USER_AGENT)
                .header("Accept", "application/json")
                .call();

            let response = match result {
                Ok(response) => response,
                Err(e) if is_transient_transport(&e) => {
                    return Attempt::Transient { reason: format!("transport error: {e}"), retry_after: None };
                }
                Err(e) => {
                    error!(error = %e, "Storefront request could not be issued");
                    return Attempt::Fatal(FetchError::Request { reason: e.to_string() });
                }
            };

            let status = response.status().as_u16();
            match classify_status(status) {
                StatusClass::Success => {}
                StatusClass::Transient => {
                    let retry_after = if status == 429 { retry_after_header(response.headers()) } else { None };
                    return Attempt::Transient { reason: format!("HTTP {status}"), retry_after };
                }
                StatusClass::Fatal => {
                    error!(status, "Storefront rejected the request");
                    return Attempt::Fatal(FetchError::Rejected { status });
                }
            }

            let mut body_reader = response.into_body();
            let body = match body_reader.read_to_string() {
                Ok(body) => body,
                Err(e) if is_transient_transport(&e) => {
                    return Attempt::Transient { reason: format!("body read failed: {e}"), retry_after: None };
                }
                Err(e) => return Attempt::Fatal(FetchError::Decode { reason: e.to_string() }),
            };

            match serde_json::from_str::<Value>(&body) {
                Ok(payload) => {
                    info!(status, bytes = body.len(), attempt, "Fetched promotions payload");
                    Attempt::Done(payload)
                }
                Err(e) => {
                    error!(error = %e, bytes = body.len(), "Storefront body is not valid JSON");
                    Attempt::Fatal(FetchError::Decode { reason: e.to_string() })
                }
            }
        });

        outcome.map_err(|give_up| match give_up {
            GiveUp::Fatal(e) => e,
            GiveUp::Exhausted { attempts, last } => {
                error!(attempts, last = %last, "Giving up on storefront");
                FetchError::Exhausted { attempts, last }
            }
            GiveUp::DeadlineExceeded { attempts, last } => {
                error!(attempts, last = %last, "Invocation deadline reached while fetching");
                FetchError::DeadlineExceeded { attempts, last }
            }
        })
    }
}
