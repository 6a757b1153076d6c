use chrono::Utc;
use lambda_runtime::{Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config;
use crate::pipeline::{self, Summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Resolve and log only.
    Dry,
    Deliver,
}

/// Invocation event, typically a scheduled rule with a constant JSON input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub mode: Mode,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub allow_countries: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub mention_role_id: Option<String>,
    #[serde(default = "default_true")]
    pub notify_active: bool,
    #[serde(default = "default_true")]
    pub notify_upcoming: bool,
    #[serde(default = "default_timezone")]
    pub display_timezone: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub message: String,
    pub active: usize,
    pub upcoming: usize,
    pub messages_sent: usize,
}

impl From<Summary> for Response {
    fn from(summary: Summary) -> Self {
        let message = if summary.delivered {
            format!(
                "Success: {} active, {} upcoming, {} message(s) sent",
                summary.active, summary.upcoming, summary.messages_sent
            )
        } else {
            format!("Success: {} active, {} upcoming, nothing posted", summary.active, summary.upcoming)
        };
        Response {
            message,
            active: summary.active,
            upcoming: summary.upcoming,
            messages_sent: summary.messages_sent,
        }
    }
}

#[instrument(skip(event))]
pub async fn handler(event: LambdaEvent<Request>) -> Result<Response, Error> {
    let request = event.payload;

    let config = match config::pipeline_config(&request, |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid invocation configuration");
            return Err(e.into());
        }
    };

    // The pipeline does blocking network I/O, keep it off the async workers
    let now = Utc::now();
    let summary = match tokio::task::spawn_blocking(move || pipeline::run(&config, now)).await {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            error!(error = %e, "Free games check failed");
            return Err(e.into());
        }
        Err(e) => {
            error!(error = %e, "Pipeline task join error");
            return Err(e.into());
        }
    };

    let response = Response::from(summary);
    info!(message = %response.message, "Free games check finished");
    Ok(response)
}
