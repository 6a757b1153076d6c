use std::fmt;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tracing::{error, info, instrument};

use crate::error::DeliveryError;
use crate::model::offer::{OfferStatus, ResolvedOffer};
use crate::retry::{
    build_agent, classify_status, is_transient_transport, retry_after_header, Attempt, GiveUp, RetryPolicy,
    StatusClass,
};

/// Discord's limit on the `content` field, in characters.
pub const MESSAGE_LIMIT: usize = 2000;
pub const DESCRIPTION_CAP: usize = 200;
pub const ELLIPSIS: &str = "...";
pub const ACTIVE_HEADER: &str = "**🎮 Free Games Available Now!**";
pub const UPCOMING_HEADER: &str = "**📅 Upcoming Free Games**";
const CONTINUED: &str = " (continued)";
const ACTIVE_MARK: &str = ":alarm_clock:";
const UPCOMING_MARK: &str = ":calendar:";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M %Z";

/// What a `notify` call ended up sending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub active: usize,
    pub upcoming: usize,
    pub messages_sent: usize,
}

impl DeliveryReport {
    pub fn is_noop(&self) -> bool {
        self.messages_sent == 0
    }
}

/// Discord webhook client encapsulating the hook URL and message shaping.
#[derive(Clone)]
pub struct Discord {
    agent: ureq::Agent,
    hook_url: String,
    mention_role_id: Option<String>,
    timezone: Tz,
    retry: RetryPolicy,
}

// The hook URL is a credential, keep it out of Debug output
impl fmt::Debug for Discord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discord")
            .field("mention_role_id", &self.mention_role_id)
            .field("timezone", &self.timezone)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Discord {
    /// Create a new Discord client with the provided webhook URL.
    pub fn new(hook_url: String) -> Self {
        Self {
            agent: build_agent(Duration::from_secs(10)),
            hook_url,
            mention_role_id: None,
            timezone: Tz::UTC,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_mention(mut self, role_id: Option<String>) -> Self {
        self.mention_role_id = role_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    /// Announce the resolved offers. Nothing is sent when there is nothing to announce.
    #[instrument(level = "info", skip(self, offers, deadline), fields(offers = offers.len()))]
    pub fn notify(&self, offers: &[ResolvedOffer], deadline: Instant) -> Result<DeliveryReport, DeliveryError> {
        let active = offers.iter().filter(|o| o.status == OfferStatus::Active).count();
        let upcoming = offers.len() - active;
        if offers.is_empty() {
            info!("No active or upcoming offers; skipping Discord post");
            return Ok(DeliveryReport::default());
        }

        let messages = self.render(offers);
        let total = messages.len();
        for (index, message) in messages.iter().enumerate() {
            self.post(message, deadline)?;
            info!(part = index + 1, total, chars = message.chars().count(), "Delivered notification");
        }

        Ok(DeliveryReport { active, upcoming, messages_sent: total })
    }

    /// Build the message bodies for `offers` without sending anything.
    pub fn render(&self, offers: &[ResolvedOffer]) -> Vec<String> {
        let blocks_for = |status: OfferStatus| {
            let mut group: Vec<&ResolvedOffer> = offers.iter().filter(|o| o.status == status).collect();
            group.sort_by(|a, b| a.window.start.cmp(&b.window.start).then_with(|| a.offer.title.cmp(&b.offer.title)));
            group.into_iter().map(|o| format_offer_block(o, self.timezone)).collect::<Vec<_>>()
        };

        let groups = [
            (ACTIVE_HEADER, blocks_for(OfferStatus::Active)),
            (UPCOMING_HEADER, blocks_for(OfferStatus::Upcoming)),
        ];
        let mention = self.mention_role_id.as_ref().map(|id| format!("<@&{id}>"));
        compose_messages(&groups, mention.as_deref(), MESSAGE_LIMIT)
    }

    /// Post a single text message, retrying transient failures.
    pub fn post(&self, content: &str, deadline: Instant) -> Result<(), DeliveryError> {
        let payload = serde_json::json!({ "content": content });

        let outcome = self.retry.execute("webhook", deadline, |attempt| {
            let response = match self.agent.post(&self.hook_url).send_json(&payload) {
                Ok(response) => response,
                Err(e) if is_transient_transport(&e) => {
                    return Attempt::Transient { reason: format!("transport error: {e}"), retry_after: None };
                }
                Err(e) => {
                    error!(error = %e, "Failed to post to Discord webhook");
                    return Attempt::Fatal(DeliveryError::Request { reason: e.to_string() });
                }
            };

            let status = response.status().as_u16();
            match classify_status(status) {
                StatusClass::Success => {
                    info!(status, attempt, "Posted message to Discord webhook");
                    Attempt::Done(())
                }
                StatusClass::Transient => {
                    let retry_after = if status == 429 { retry_after_header(response.headers()) } else { None };
                    Attempt::Transient { reason: format!("HTTP {status}"), retry_after }
                }
                StatusClass::Fatal => {
                    let mut body_reader = response.into_body();
                    let body: String = body_reader.read_to_string().unwrap_or_default().chars().take(200).collect();
                    error!(status, body = %body, "Discord webhook rejected the message");
                    Attempt::Fatal(DeliveryError::Rejected { status, body })
                }
            }
        });

        outcome.map_err(|give_up| match give_up {
            GiveUp::Fatal(e) => e,
            GiveUp::Exhausted { attempts, last } => {
                error!(attempts, last = %last, "Giving up on Discord webhook");
                DeliveryError::Exhausted { attempts, last }
            }
            GiveUp::DeadlineExceeded { attempts, last } => {
                error!(attempts, last = %last, "Invocation deadline reached while posting");
                DeliveryError::DeadlineExceeded { attempts, last }
            }
        })
    }
}

/// Cut `text` to at most `cap` characters, ending at a word boundary followed by [`ELLIPSIS`].
///
/// Caps no larger than the marker itself yield only (a prefix of) the marker.
pub fn truncate_description(text: &str, cap: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let marker = ELLIPSIS.chars().count();
    if cap <= marker {
        return ELLIPSIS.chars().take(cap).collect();
    }

    let budget = cap - marker;
    let prefix: String = text.chars().take(budget).collect();
    let ends_on_word = text.chars().nth(budget).is_some_and(char::is_whitespace);
    let cut = if ends_on_word {
        prefix.as_str()
    } else {
        match prefix.rfind(char::is_whitespace) {
            Some(idx) if idx > 0 => &prefix[..idx],
            _ => prefix.as_str(),
        }
    };
    format!("{}{ELLIPSIS}", cut.trim_end())
}

/// One offer's lines: title and publisher, description, window, store link.
pub fn format_offer_block(resolved: &ResolvedOffer, timezone: Tz) -> String {
    let offer = &resolved.offer;
    let mut lines = Vec::with_capacity(4);

    if offer.publisher.is_empty() {
        lines.push(format!("**{}**", offer.title));
    } else {
        lines.push(format!("**{}** by {}", offer.title, offer.publisher));
    }

    let description = truncate_description(&offer.description, DESCRIPTION_CAP);
    if !description.is_empty() {
        lines.push(description);
    }

    let start = resolved.window.start.with_timezone(&timezone).format(DATE_FORMAT);
    let end = resolved.window.end.with_timezone(&timezone).format(DATE_FORMAT);
    match resolved.status {
        OfferStatus::Active => lines.push(format!("{ACTIVE_MARK} Free until {end}")),
        OfferStatus::Upcoming => lines.push(format!("{UPCOMING_MARK} Free from {start} until {end}")),
    }

    if !offer.store_url.is_empty() {
        lines.push(format!("<{}>", offer.store_url));
    }

    lines.join("\n")
}

/// Pack group headers and offer blocks into messages of at most `limit` characters.
///
/// Everything goes into one message when it fits. Otherwise each group starts a new message,
/// a group that overflows continues under its header marked as continued, and an offer block is
/// never split across messages. The mention is only put on the first message.
pub fn compose_messages(groups: &[(&str, Vec<String>)], mention: Option<&str>, limit: usize) -> Vec<String> {
    let groups: Vec<&(&str, Vec<String>)> = groups.iter().filter(|(_, blocks)| !blocks.is_empty()).collect();
    if groups.is_empty() {
        return Vec::new();
    }
    let prefix = mention.map(|m| format!("{m}\n")).unwrap_or_default();
    let prefix_len = prefix.chars().count();

    let single = groups
        .iter()
        .map(|(header, blocks)| format!("{header}\n\n{}", blocks.join("\n\n")))
        .collect::<Vec<_>>()
        .join("\n\n");
    if prefix_len + single.chars().count() <= limit {
        return vec![format!("{prefix}{single}")];
    }

    let mut messages: Vec<String> = Vec::new();
    for (header, blocks) in groups {
        let mut current = header.to_string();
        let mut has_block = false;

        for block in blocks {
            let reserved = if messages.is_empty() { prefix_len } else { 0 };
            let candidate_len = current.chars().count() + 2 + block.chars().count();
            if candidate_len + reserved <= limit {
                current.push_str("\n\n");
                current.push_str(block);
                has_block = true;
                continue;
            }

            if has_block {
                messages.push(current);
                current = format!("{header}{CONTINUED}");
            }
            let reserved = if messages.is_empty() { prefix_len } else { 0 };
            let room = limit.saturating_sub(reserved + current.chars().count() + 2);
            current.push_str("\n\n");
            current.push_str(&fit_block(block, room));
            has_block = true;
        }

        messages.push(current);
    }

    if let Some(first) = messages.first_mut() {
        first.insert_str(0, &prefix);
    }
    messages
}

/// Shrink an offer block to `room` characters. The title and description lines are cut first so
/// the window line and store link survive.
fn fit_block(block: &str, room: usize) -> String {
    let lines: Vec<&str> = block.lines().collect();
    let window_line = lines
        .iter()
        .position(|line| line.starts_with(ACTIVE_MARK) || line.starts_with(UPCOMING_MARK))
        .filter(|&idx| idx > 0);

    if let Some(idx) = window_line {
        let tail = lines[idx..].join("\n");
        let tail_len = tail.chars().count();
        if tail_len < room {
            let head = truncate_description(&lines[..idx].join("\n"), room - tail_len - 1);
            if head.is_empty() {
                return tail;
            }
            return format!("{head}\n{tail}");
        }
    }
    truncate_description(block, room)
}
