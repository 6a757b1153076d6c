use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::offer::{GameOffer, OfferStatus, Resolution, ResolvedOffer};

/// Derive the status of an offer at `now` purely from its windows.
///
/// A window containing `now` wins (so an upcoming window that has already started takes over
/// from an ended active one). Failing that, the earliest window that has not started yet makes
/// the offer upcoming. Anything else is expired.
pub fn resolve_status(offer: &GameOffer, now: DateTime<Utc>) -> Resolution {
    let windows = [offer.active_window, offer.upcoming_window];

    if let Some(current) = windows.iter().flatten().find(|w| w.contains(now)) {
        return Resolution::Active(*current);
    }

    windows
        .iter()
        .flatten()
        .filter(|w| w.starts_after(now))
        .min_by_key(|w| w.start)
        .map_or(Resolution::Expired, |next| Resolution::Upcoming(*next))
}

/// Resolve every candidate and drop the expired ones. Order is preserved.
pub fn resolve(offers: Vec<GameOffer>, now: DateTime<Utc>) -> Vec<ResolvedOffer> {
    offers
        .into_iter()
        .filter_map(|offer| {
            let (status, window) = match resolve_status(&offer, now) {
                Resolution::Active(window) => (OfferStatus::Active, window),
                Resolution::Upcoming(window) => (OfferStatus::Upcoming, window),
                Resolution::Expired => {
                    debug!(id = %offer.id, title = %offer.title, "Promotion expired, excluding");
                    return None;
                }
            };
            Some(ResolvedOffer { offer, status, window })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::offer::PromotionWindow;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn window(from_hours: i64, to_hours: i64) -> PromotionWindow {
        PromotionWindow::new(now() + Duration::hours(from_hours), now() + Duration::hours(to_hours)).unwrap()
    }

    fn offer(active: Option<PromotionWindow>, upcoming: Option<PromotionWindow>) -> GameOffer {
        GameOffer {
            id: "ns:1".to_string(),
            title: "Hollow Lantern".to_string(),
            description: String::new(),
            publisher: String::new(),
            store_url: String::new(),
            thumbnail_url: String::new(),
            original_price: 1000,
            discount_price: 0,
            active_window: active,
            upcoming_window: upcoming,
        }
    }

    #[test]
    fn running_window_is_active() {
        let w = window(-1, 1);
        assert_eq!(resolve_status(&offer(Some(w), None), now()), Resolution::Active(w));
    }

    #[test]
    fn end_is_exclusive() {
        let w = window(-2, 0);
        assert_eq!(resolve_status(&offer(Some(w), None), now()), Resolution::Expired);
    }

    #[test]
    fn future_window_is_upcoming() {
        let w = window(48, 216);
        assert_eq!(resolve_status(&offer(None, Some(w)), now()), Resolution::Upcoming(w));
    }

    #[test]
    fn started_upcoming_window_takes_over_from_ended_active() {
        let ended = window(-48, -1);
        let started = window(-1, 100);
        assert_eq!(resolve_status(&offer(Some(ended), Some(started)), now()), Resolution::Active(started));
    }

    #[test]
    fn active_now_and_again_later_reports_the_current_window() {
        let current = window(-1, 24);
        let later = window(200, 300);
        assert_eq!(resolve_status(&offer(Some(current), Some(later)), now()), Resolution::Active(current));
    }

    #[test]
    fn resolve_drops_expired_and_keeps_order() {
        let mut gone = offer(Some(window(-48, -24)), None);
        gone.id = "ns:gone".to_string();
        let mut soon = offer(None, Some(window(24, 48)));
        soon.id = "ns:soon".to_string();
        let mut live = offer(Some(window(-1, 1)), None);
        live.id = "ns:live".to_string();

        let resolved = resolve(vec![soon, gone, live], now());

        let ids: Vec<_> = resolved.iter().map(|r| (r.offer.id.as_str(), r.status)).collect();
        assert_eq!(ids, vec![("ns:soon", OfferStatus::Upcoming), ("ns:live", OfferStatus::Active)]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let offers = vec![offer(Some(window(-1, 1)), Some(window(50, 60)))];
        assert_eq!(resolve(offers.clone(), now()), resolve(offers, now()));
    }
}
