use std::time::Duration;

use chrono_tz::Tz;
use tracing::info;

use crate::error::PipelineError;
use crate::handler::{Mode, Request};
use crate::pipeline::PipelineConfig;

pub const ENV_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const ENV_MENTION_ROLE_ID: &str = "DISCORD_MENTION_ROLE_ID";
pub const ENV_LOCALE: &str = "EPIC_LOCALE";
pub const ENV_COUNTRY: &str = "EPIC_COUNTRY";

/// Build the run configuration from the invocation event, with environment values taking
/// precedence. `env` looks up a variable by name; empty values count as unset.
pub fn pipeline_config(
    request: &Request,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PipelineConfig, PipelineError> {
    let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let locale = lookup(ENV_LOCALE).unwrap_or_else(|| request.locale.clone());
    // An env country also replaces allowCountries
    let (country, allow_countries) = match lookup(ENV_COUNTRY) {
        Some(country) => (country.clone(), country),
        None => (
            request.country.clone(),
            request.allow_countries.clone().unwrap_or_else(|| request.country.clone()),
        ),
    };
    let webhook_url = lookup(ENV_WEBHOOK_URL).or_else(|| request.webhook_url.clone());
    let mention_role_id = lookup(ENV_MENTION_ROLE_ID).or_else(|| request.mention_role_id.clone());

    let display_timezone: Tz = request
        .display_timezone
        .parse()
        .map_err(|_| PipelineError::Config(format!("unknown display timezone {:?}", request.display_timezone)))?;

    let deliver = request.mode == Mode::Deliver;
    if deliver && webhook_url.as_deref().is_none_or(str::is_empty) {
        return Err(PipelineError::Config(format!(
            "deliver mode needs a webhook URL (request field or {ENV_WEBHOOK_URL})"
        )));
    }
    if request.timeout_secs == 0 {
        return Err(PipelineError::Config("timeout_secs must be positive".to_string()));
    }

    info!(%locale, %country, %allow_countries, deliver, mention = mention_role_id.is_some(), "Loaded configuration");

    Ok(PipelineConfig {
        locale,
        country,
        allow_countries,
        webhook_url,
        mention_role_id,
        deliver,
        notify_active: request.notify_active,
        notify_upcoming: request.notify_upcoming,
        display_timezone,
        invocation_timeout: Duration::from_secs(request.timeout_secs),
        ..PipelineConfig::default()
    })
}
