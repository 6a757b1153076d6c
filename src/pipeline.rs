use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, instrument};

use crate::discord::Discord;
use crate::epic::{EpicStore, DEFAULT_REQUEST_TIMEOUT, PROMOTIONS_URL};
use crate::error::PipelineError;
use crate::model::offer::{OfferStatus, ResolvedOffer};
use crate::promotions::parse_offers;
use crate::resolver::resolve;
use crate::retry::RetryPolicy;

/// Everything one run needs; built by the caller, never read from globals.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub locale: String,
    pub country: String,
    pub allow_countries: String,
    pub store_endpoint: String,
    pub webhook_url: Option<String>,
    pub mention_role_id: Option<String>,
    /// When false the run resolves and logs offers but posts nothing.
    pub deliver: bool,
    pub notify_active: bool,
    pub notify_upcoming: bool,
    pub display_timezone: Tz,
    pub request_timeout: Duration,
    /// Budget for the whole run; retries stop once it is spent.
    pub invocation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            country: "US".to_string(),
            allow_countries: "US".to_string(),
            store_endpoint: PROMOTIONS_URL.to_string(),
            webhook_url: None,
            mention_role_id: None,
            deliver: false,
            notify_active: true,
            notify_upcoming: true,
            display_timezone: Tz::UTC,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            invocation_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a run, surfaced by the trigger as its response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub active: usize,
    pub upcoming: usize,
    pub messages_sent: usize,
    pub delivered: bool,
}

/// Fetch, parse, resolve and notify, in that order.
#[instrument(level = "info", skip(config), fields(locale = %config.locale, country = %config.country, deliver = config.deliver))]
pub fn run(config: &PipelineConfig, now: DateTime<Utc>) -> Result<Summary, PipelineError> {
    let started = Instant::now();
    let deadline = started.checked_add(config.invocation_timeout).unwrap_or(started);

    let store = EpicStore::new(config.store_endpoint.clone(), config.request_timeout, config.retry.clone())
        .with_allow_countries(config.allow_countries.clone());
    let payload = store.fetch(&config.locale, &config.country, deadline)?;

    let candidates = parse_offers(&payload, &config.locale)?;
    let resolved = resolve(candidates, now);
    for item in &resolved {
        info!(status = ?item.status, title = %item.offer.title, url = %item.offer.store_url, "Resolved offer");
    }

    let selected: Vec<ResolvedOffer> = resolved
        .into_iter()
        .filter(|o| match o.status {
            OfferStatus::Active => config.notify_active,
            OfferStatus::Upcoming => config.notify_upcoming,
        })
        .collect();
    let active = selected.iter().filter(|o| o.status == OfferStatus::Active).count();
    let upcoming = selected.len() - active;
    info!(active, upcoming, "Selected offers for notification");

    if !config.deliver {
        info!("Dry run; skipping Discord post");
        return Ok(Summary { active, upcoming, messages_sent: 0, delivered: false });
    }

    let hook_url = config
        .webhook_url
        .clone()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| PipelineError::Config("a webhook URL is required to deliver".to_string()))?;
    let discord = Discord::new(hook_url)
        .with_mention(config.mention_role_id.clone())
        .with_timezone(config.display_timezone)
        .with_retry(config.retry.clone())
        .with_request_timeout(config.request_timeout);

    let report = discord.notify(&selected, deadline)?;
    info!(
        messages = report.messages_sent,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Pipeline run finished"
    );

    Ok(Summary {
        active: report.active,
        upcoming: report.upcoming,
        messages_sent: report.messages_sent,
        delivered: !report.is_noop(),
    })
}
