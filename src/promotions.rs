use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::ParseError;
use crate::model::offer::{GameOffer, PromotionWindow};
use crate::model::promotion::{CatalogElement, OfferGroup, PageMapping, PromotionalOffer, PromotionsDocument};

/// The storefront attaches this error code to otherwise valid responses.
const HARMLESS_ERROR_CODE: &str = "1004";
const THUMBNAIL_TYPES: [&str; 3] = ["Thumbnail", "OfferImageWide", "DieselStoreFrontWide"];
const STORE_BASE_URL: &str = "https://store.epicgames.com";

/// Turn a raw promotions payload into de-duplicated zero-price offer candidates.
///
/// Only a payload that is not a promotions document at all is an error; individual catalog
/// elements that cannot be used are logged and skipped. Output keeps payload order, with a
/// replaced duplicate taking the slot of its first occurrence.
#[instrument(level = "info", skip(payload))]
pub fn parse_offers(payload: &Value, locale: &str) -> Result<Vec<GameOffer>, ParseError> {
    if !payload.is_object() {
        return Err(ParseError::UnexpectedShape {
            reason: format!("expected a JSON object at the top level, got {}", json_kind(payload)),
        });
    }

    let doc = PromotionsDocument::deserialize(payload)
        .map_err(|e| ParseError::UnexpectedShape { reason: e.to_string() })?;

    let errors = significant_errors(doc.errors.as_deref().unwrap_or_default());
    let elements = doc
        .data
        .and_then(|d| d.catalog)
        .and_then(|c| c.search_store)
        .and_then(|s| s.elements);

    let Some(elements) = elements else {
        if !errors.is_empty() {
            return Err(ParseError::ErrorEnvelope { messages: errors });
        }
        return Err(ParseError::UnexpectedShape {
            reason: "missing data.Catalog.searchStore.elements".to_string(),
        });
    };
    if !errors.is_empty() {
        warn!(errors = ?errors, "Storefront reported errors alongside data");
    }

    let mut offers = Vec::with_capacity(elements.len());
    for (index, raw) in elements.iter().enumerate() {
        let element = match CatalogElement::deserialize(raw) {
            Ok(element) => element,
            Err(e) => {
                warn!(index, error = %e, "Dropping catalog element with unreadable price or promotions");
                continue;
            }
        };
        if let Some(offer) = offer_from_element(element, locale) {
            offers.push(offer);
        }
    }

    let offers = dedupe(offers);
    info!(elements = elements.len(), offers = offers.len(), "Parsed promotions payload");
    Ok(offers)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Messages of upstream errors, minus the known harmless ones.
fn significant_errors(errors: &[Value]) -> Vec<String> {
    errors
        .iter()
        .filter(|err| {
            let code = match err.get("errorCode") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            code != HARMLESS_ERROR_CODE
        })
        .map(|err| {
            err.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string())
        })
        .collect()
}

fn offer_from_element(element: CatalogElement, locale: &str) -> Option<GameOffer> {
    let title = match element.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            warn!(id = ?element.id, namespace = ?element.namespace, "Dropping catalog element without a title");
            return None;
        }
    };

    let Some(promotions) = element.promotions.as_ref() else {
        debug!(title = %title, "No promotions block");
        return None;
    };

    let total = element.price.as_ref().and_then(|p| p.total_price.as_ref());
    let original_price = total.and_then(|t| t.original_price).map(non_negative).unwrap_or(0);
    let discount_price = total.and_then(|t| t.discount_price).map(non_negative).unwrap_or(0);
    let listed_free = discount_price == 0 && original_price > 0;

    let active_window = select_free_window(promotions.promotional_offers.as_deref(), listed_free);
    let upcoming_window = select_free_window(promotions.upcoming_promotional_offers.as_deref(), listed_free);
    if active_window.is_none() && upcoming_window.is_none() {
        debug!(title = %title, "No zero-price promotion window");
        return None;
    }

    let namespace = element.namespace.clone().unwrap_or_default();
    let item_id = element
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| title.clone());

    Some(GameOffer {
        id: format!("{namespace}:{item_id}"),
        description: element.description.clone().map(|d| d.trim().to_string()).unwrap_or_default(),
        publisher: element.seller.as_ref().and_then(|s| s.name.clone()).unwrap_or_default(),
        store_url: store_url(&element, locale),
        thumbnail_url: thumbnail_url(&element),
        title,
        original_price,
        discount_price,
        active_window,
        upcoming_window,
    })
}

fn non_negative(amount: i64) -> u64 {
    u64::try_from(amount).unwrap_or(0)
}

/// Flatten the offer groups and pick the earliest-starting window that makes the title free.
fn select_free_window(groups: Option<&[OfferGroup]>, listed_free: bool) -> Option<PromotionWindow> {
    groups
        .unwrap_or_default()
        .iter()
        .flat_map(|g| g.promotional_offers.as_deref().unwrap_or_default())
        .filter(|offer| reduces_to_zero(offer, listed_free))
        .filter_map(window_of)
        .min_by_key(|w| w.start)
}

/// A remaining-price percentage of 0 means free. Without a discount setting, fall back to the
/// listed price.
fn reduces_to_zero(offer: &PromotionalOffer, listed_free: bool) -> bool {
    match offer.discount_setting.as_ref().and_then(|d| d.discount_percentage) {
        Some(percentage) => percentage == 0,
        None => listed_free,
    }
}

fn window_of(offer: &PromotionalOffer) -> Option<PromotionWindow> {
    let start = offer.start_date.as_deref().and_then(parse_timestamp);
    let end = offer.end_date.as_deref().and_then(parse_timestamp);
    match (start, end) {
        (Some(start), Some(end)) => {
            let window = PromotionWindow::new(start, end);
            if window.is_none() {
                debug!(%start, %end, "Ignoring inverted promotion window");
            }
            window
        }
        _ => {
            debug!(start = ?offer.start_date, end = ?offer.end_date, "Ignoring promotion window with unreadable dates");
            None
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .ok()
}

fn store_url(element: &CatalogElement, locale: &str) -> String {
    let from_mappings = |mappings: Option<&Vec<PageMapping>>| {
        mappings
            .into_iter()
            .flatten()
            .find_map(|m| m.page_slug.clone().filter(|s| !s.is_empty()))
    };

    let slug = from_mappings(element.offer_mappings.as_ref())
        .or_else(|| from_mappings(element.catalog_ns.as_ref().and_then(|ns| ns.mappings.as_ref())))
        .or_else(|| {
            element
                .product_slug
                .as_deref()
                .map(|s| s.trim_end_matches("/home").to_string())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| element.url_slug.clone().filter(|s| !s.is_empty()));

    match slug {
        Some(slug) => format!("{STORE_BASE_URL}/{locale}/p/{slug}"),
        None => String::new(),
    }
}

fn thumbnail_url(element: &CatalogElement) -> String {
    let images = element.key_images.as_deref().unwrap_or_default();
    let usable = |url: &Option<String>| url.clone().filter(|u| !u.is_empty());

    THUMBNAIL_TYPES
        .iter()
        .find_map(|wanted| {
            images
                .iter()
                .filter(|img| img.type_field.as_deref() == Some(*wanted))
                .find_map(|img| usable(&img.url))
        })
        .or_else(|| images.iter().find_map(|img| usable(&img.url)))
        .unwrap_or_default()
}

/// One record per id; a later duplicate only wins if it carries more display fields.
fn dedupe(offers: Vec<GameOffer>) -> Vec<GameOffer> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<GameOffer> = Vec::with_capacity(offers.len());

    for offer in offers {
        match slots.get(&offer.id) {
            Some(&slot) => {
                if offer.completeness() > unique[slot].completeness() {
                    debug!(id = %offer.id, "Replacing duplicate with a more complete record");
                    unique[slot] = offer;
                } else {
                    debug!(id = %offer.id, "Dropping duplicate record");
                }
            }
            None => {
                slots.insert(offer.id.clone(), unique.len());
                unique.push(offer);
            }
        }
    }

    unique
}
