use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, warn};

/// Bounded retry with exponential backoff, shared by the storefront fetch and webhook delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound applied to server-provided `Retry-After` values.
    pub max_retry_after: Duration,
}

pub trait BackoffPolicy {
    /// Delay to wait after attempt number `attempt` (1-based) failed.
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy for RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let capped = self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay);
        jitter(capped)
    }
}

/// Uniform jitter in `[delay / 2, delay]`.
fn jitter(delay: Duration) -> Duration {
    let full = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if full < 2 {
        return delay;
    }
    let ms = rand::thread_rng().gen_range(full / 2..=full);
    Duration::from_millis(ms)
}

/// Outcome of a single attempt, as judged by the caller.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    /// Not worth retrying; surfaces immediately.
    Fatal(E),
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },
}

/// Why the retry loop stopped without a result.
#[derive(Debug)]
pub enum GiveUp<E> {
    Fatal(E),
    Exhausted { attempts: u32, last: String },
    DeadlineExceeded { attempts: u32, last: String },
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails fatally, runs out of attempts, or the next wait would
    /// cross `deadline`. `op` receives the 1-based attempt number.
    pub fn execute<T, E>(
        &self,
        upstream: &str,
        deadline: Instant,
        mut op: impl FnMut(u32) -> Attempt<T, E>,
    ) -> Result<T, GiveUp<E>> {
        let max_attempts = self.max_attempts.max(1);
        let mut last = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            if Instant::now() >= deadline {
                return Err(GiveUp::DeadlineExceeded { attempts: attempt - 1, last });
            }

            let (reason, retry_after) = match op(attempt) {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fatal(e) => return Err(GiveUp::Fatal(e)),
                Attempt::Transient { reason, retry_after } => (reason, retry_after),
            };

            if attempt == max_attempts {
                warn!(upstream, attempt, reason = %reason, "Retry budget exhausted");
                return Err(GiveUp::Exhausted { attempts: attempt, last: reason });
            }

            let delay = match retry_after {
                Some(d) => d.min(self.max_retry_after),
                None => self.delay_for_attempt(attempt),
            };
            let crosses_deadline = Instant::now()
                .checked_add(delay)
                .is_none_or(|wake| wake >= deadline);
            if crosses_deadline {
                warn!(upstream, attempt, delay_ms = delay.as_millis() as u64, reason = %reason, "Backoff would cross invocation deadline");
                return Err(GiveUp::DeadlineExceeded { attempts: attempt, last: reason });
            }

            warn!(upstream, attempt, delay_ms = delay.as_millis() as u64, reason = %reason, "Transient failure, backing off");
            last = reason;
            thread::sleep(delay);
        }

        Err(GiveUp::Exhausted { attempts: max_attempts, last })
    }
}

/// Parse a `Retry-After` value: delta seconds (fractional accepted) or an HTTP-date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            // Too large for a Duration; the caller clamps to its own ceiling
            return Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX));
        }
        return None;
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((when - now).to_std().unwrap_or(Duration::ZERO))
}

/// Read and parse the `Retry-After` header of a response, if any.
pub fn retry_after_header(headers: &ureq::http::HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    let parsed = parse_retry_after(raw, Utc::now());
    debug!(raw, ?parsed, "Read Retry-After header");
    parsed
}

/// How an HTTP status should be treated by a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Transient,
    Fatal,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Fatal,
    }
}

/// Agent that hands non-2xx responses back as responses so the retry loop can classify them.
pub fn build_agent(request_timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(request_timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

/// Transport-level failures that are worth another attempt.
pub fn is_transient_transport(err: &ureq::Error) -> bool {
    matches!(
        err,
        ureq::Error::Timeout(_) | ureq::Error::Io(_) | ureq::Error::ConnectionFailed | ureq::Error::HostNotFound
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            max_retry_after: Duration::from_secs(1),
        }
    }

    #[test]
    fn backoff_doubles_within_jitter_and_caps() {
        let p = policy(100, 300);
        for _ in 0..50 {
            let d1 = p.delay_for_attempt(1).as_millis();
            let d2 = p.delay_for_attempt(2).as_millis();
            let d5 = p.delay_for_attempt(5).as_millis();
            assert!((50..=100).contains(&d1), "d1 was {d1}");
            assert!((100..=200).contains(&d2), "d2 was {d2}");
            assert!((150..=300).contains(&d5), "d5 was {d5}");
        }
    }

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();
        assert_eq!(parse_retry_after("2", now), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 0.5 ", now), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now), Some(Duration::from_secs(60)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("-3", now), None);
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn huge_retry_after_saturates_instead_of_panicking() {
        let now = Utc::now();
        assert_eq!(parse_retry_after("1e30", now), Some(Duration::MAX));
        assert_eq!(parse_retry_after("99999999999999999999", now), Some(Duration::MAX));
    }

    #[test]
    fn huge_retry_after_is_clamped_to_the_policy_ceiling() {
        let p = policy(1, 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        let started = Instant::now();
        let result: Result<u32, GiveUp<()>> = p.execute("test", deadline, |attempt| {
            if attempt == 1 {
                Attempt::Transient { reason: "429".into(), retry_after: parse_retry_after("1e30", Utc::now()) }
            } else {
                Attempt::Done(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn status_classes() {
        assert_eq!(classify_status(204), StatusClass::Success);
        assert_eq!(classify_status(429), StatusClass::Transient);
        assert_eq!(classify_status(503), StatusClass::Transient);
        assert_eq!(classify_status(401), StatusClass::Fatal);
        assert_eq!(classify_status(404), StatusClass::Fatal);
    }

    #[test]
    fn execute_retries_transient_then_succeeds() {
        let p = policy(1, 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result: Result<u32, GiveUp<()>> = p.execute("test", deadline, |attempt| {
            if attempt < 3 {
                Attempt::Transient { reason: format!("boom {attempt}"), retry_after: None }
            } else {
                Attempt::Done(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn execute_stops_on_fatal_without_retrying() {
        let p = policy(1, 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut calls = 0;
        let result: Result<(), GiveUp<&str>> = p.execute("test", deadline, |_| {
            calls += 1;
            Attempt::Fatal("nope")
        });
        assert!(matches!(result, Err(GiveUp::Fatal("nope"))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn execute_reports_exhaustion() {
        let p = policy(1, 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result: Result<(), GiveUp<()>> = p.execute("test", deadline, |_| Attempt::Transient {
            reason: "503".into(),
            retry_after: None,
        });
        match result {
            Err(GiveUp::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "503");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn execute_gives_up_when_backoff_crosses_deadline() {
        let p = policy(1, 2);
        let deadline = Instant::now() + Duration::from_millis(50);
        let mut calls = 0;
        let result: Result<(), GiveUp<()>> = p.execute("test", deadline, |_| {
            calls += 1;
            Attempt::Transient { reason: "429".into(), retry_after: Some(Duration::from_millis(900)) }
        });
        assert!(matches!(result, Err(GiveUp::DeadlineExceeded { attempts: 1, .. })));
        assert_eq!(calls, 1);
    }
}
