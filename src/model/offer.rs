use chrono::{DateTime, Utc};
use serde::Serialize;

/// A `[start, end)` period during which a listing is discounted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PromotionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PromotionWindow {
    /// Returns `None` for empty or inverted windows.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }

    pub fn starts_after(&self, now: DateTime<Utc>) -> bool {
        self.start > now
    }
}

/// One promotable title, freshly built from the latest payload on every run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameOffer {
    /// `namespace:id`
    pub id: String,
    pub title: String,
    pub description: String,
    pub publisher: String,
    pub store_url: String,
    pub thumbnail_url: String,
    pub original_price: u64,
    pub discount_price: u64,
    pub active_window: Option<PromotionWindow>,
    pub upcoming_window: Option<PromotionWindow>,
}

impl GameOffer {
    /// Number of optional display fields that are filled in; used to pick between duplicates.
    pub fn completeness(&self) -> u8 {
        u8::from(!self.description.is_empty()) + u8::from(!self.thumbnail_url.is_empty())
    }
}

/// Reported status of an offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Active,
    Upcoming,
}

/// Result of evaluating an offer at a point in time. `Expired` never leaves the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Active(PromotionWindow),
    Upcoming(PromotionWindow),
    Expired,
}

/// An offer with the status and window in effect at the evaluation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedOffer {
    pub offer: GameOffer,
    pub status: OfferStatus,
    pub window: PromotionWindow,
}
