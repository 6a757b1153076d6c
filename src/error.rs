use thiserror::Error;

/// Failure reaching the storefront promotions endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The storefront answered with a status that retrying cannot fix (4xx other than 429).
    #[error("storefront rejected the request with HTTP {status}")]
    Rejected { status: u16 },

    /// The body was not valid JSON.
    #[error("storefront response was not valid JSON: {reason}")]
    Decode { reason: String },

    /// The request could not be built or sent at all (bad URL, TLS setup, ...).
    #[error("storefront request could not be issued: {reason}")]
    Request { reason: String },

    /// Every attempt hit a transient failure.
    #[error("storefront still failing after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    /// The invocation deadline passed before a retry could be made.
    #[error("invocation deadline exceeded after {attempts} attempts: {last}")]
    DeadlineExceeded { attempts: u32, last: String },
}

impl FetchError {
    /// True for the retryable subtype, i.e. transient failures that outlasted the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Exhausted { .. } | FetchError::DeadlineExceeded { .. })
    }
}

/// The payload did not have the shape of a promotions document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("storefront returned an error envelope instead of data: {}", .messages.join("; "))]
    ErrorEnvelope { messages: Vec<String> },

    #[error("unexpected promotions payload shape: {reason}")]
    UnexpectedShape { reason: String },
}

/// Failure posting to the chat webhook.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Webhook rejected the message (revoked, bad payload, ...); not retried.
    #[error("webhook rejected the message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("webhook request could not be issued: {reason}")]
    Request { reason: String },

    #[error("webhook still failing after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("invocation deadline exceeded after {attempts} attempts: {last}")]
    DeadlineExceeded { attempts: u32, last: String },
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Exhausted { .. } | DeliveryError::DeadlineExceeded { .. })
    }
}

/// Anything that stops a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
