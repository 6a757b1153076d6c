use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

// The storefront sends `null` for most absent fields, so collections are `Option<Vec<_>>`
// rather than `#[serde(default)]` vectors.

/// Decode a display field, treating a value of the wrong type like an absent one.
fn or_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).ok())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromotionsDocument {
    #[serde(default)]
    pub data: Option<DataBlock>,
    #[serde(default)]
    pub errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataBlock {
    #[serde(rename = "Catalog", default)]
    pub catalog: Option<Catalog>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "searchStore", default)]
    pub search_store: Option<SearchStore>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchStore {
    // Kept raw so one malformed element can be dropped without failing the whole page
    #[serde(default)]
    pub elements: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogElement {
    // A title of the wrong type decodes as `None` and the element is dropped by the parser
    #[serde(default, deserialize_with = "or_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "or_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "or_none")]
    pub namespace: Option<String>,
    #[serde(default, deserialize_with = "or_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "or_none")]
    pub seller: Option<Seller>,
    #[serde(default, deserialize_with = "or_none")]
    pub product_slug: Option<String>,
    #[serde(default, deserialize_with = "or_none")]
    pub url_slug: Option<String>,
    #[serde(default, deserialize_with = "or_none")]
    pub key_images: Option<Vec<KeyImage>>,
    pub price: Option<Price>,
    pub promotions: Option<Promotions>,
    #[serde(default, deserialize_with = "or_none")]
    pub offer_mappings: Option<Vec<PageMapping>>,
    #[serde(default, deserialize_with = "or_none")]
    pub catalog_ns: Option<CatalogNamespace>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Seller {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyImage {
    #[serde(rename = "type")]
    pub type_field: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub total_price: Option<TotalPrice>,
}

/// Amounts are in minor currency units.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalPrice {
    pub original_price: Option<i64>,
    pub discount_price: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotions {
    pub promotional_offers: Option<Vec<OfferGroup>>,
    pub upcoming_promotional_offers: Option<Vec<OfferGroup>>,
}

/// One group of discrete offer windows.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferGroup {
    pub promotional_offers: Option<Vec<PromotionalOffer>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionalOffer {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub discount_setting: Option<DiscountSetting>,
}

/// `discount_percentage` is the share of the price that remains: 0 means free.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountSetting {
    pub discount_type: Option<String>,
    pub discount_percentage: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMapping {
    pub page_slug: Option<String>,
    pub page_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogNamespace {
    pub mappings: Option<Vec<PageMapping>>,
}
