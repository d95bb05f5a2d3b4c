//! Listing formatters
//!
//! A formatter turns the payload the price service returns for one item
//! into the fields stored in that item's cache record. The client only
//! needs to attach a `fetch_time` afterwards; the rest of the shape is up
//! to the formatter.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{PriceError, Result};

/// Fields a formatter produces for one record
pub type RecordFields = Map<String, Value>;

/// Converts one item payload into record fields
pub trait Formatter: Send + Sync {
    fn format(&self, payload: &Value) -> Result<RecordFields>;
}

impl<F> Formatter for F
where
    F: Fn(&Value) -> Result<RecordFields> + Send + Sync,
{
    fn format(&self, payload: &Value) -> Result<RecordFields> {
        self(payload)
    }
}

/// Records the cheapest active listing
///
/// Writes `price` (per unit), `quantity`, `hq` and `listing_count`. With
/// `hq_only` set, only high-quality listings are considered and `price` is
/// left out when none exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestListing {
    pub hq_only: bool,
}

impl LowestListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hq_only() -> Self {
        Self { hq_only: true }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Listing {
    price_per_unit: f64,
    #[serde(default)]
    quantity: u64,
    #[serde(default)]
    hq: bool,
}

#[derive(Debug, Deserialize)]
struct ListingsPayload {
    listings: Vec<Listing>,
}

impl Formatter for LowestListing {
    fn format(&self, payload: &Value) -> Result<RecordFields> {
        let parsed = ListingsPayload::deserialize(payload)
            .map_err(|e| PriceError::Format(e.to_string()))?;

        let candidates: Vec<&Listing> = parsed
            .listings
            .iter()
            .filter(|listing| !self.hq_only || listing.hq)
            .collect();

        let mut fields = RecordFields::new();
        fields.insert("listing_count".to_string(), Value::from(candidates.len()));

        let cheapest = candidates
            .into_iter()
            .min_by(|a, b| a.price_per_unit.total_cmp(&b.price_per_unit));

        if let Some(listing) = cheapest {
            fields.insert("price".to_string(), Value::from(listing.price_per_unit));
            fields.insert("quantity".to_string(), Value::from(listing.quantity));
            fields.insert("hq".to_string(), Value::from(listing.hq));
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "itemID": 5057,
            "listings": [
                { "pricePerUnit": 120, "quantity": 5, "hq": false },
                { "pricePerUnit": 95, "quantity": 2, "hq": false },
                { "pricePerUnit": 300, "quantity": 1, "hq": true }
            ]
        })
    }

    #[test]
    fn test_lowest_listing_picks_cheapest_unit_price() {
        let fields = LowestListing::new().format(&payload()).unwrap();

        assert_eq!(fields["price"].as_f64(), Some(95.0));
        assert_eq!(fields["quantity"].as_u64(), Some(2));
        assert_eq!(fields["hq"], json!(false));
        assert_eq!(fields["listing_count"].as_u64(), Some(3));
    }

    #[test]
    fn test_hq_only_ignores_normal_quality_listings() {
        let fields = LowestListing::hq_only().format(&payload()).unwrap();

        assert_eq!(fields["price"].as_f64(), Some(300.0));
        assert_eq!(fields["hq"], json!(true));
        assert_eq!(fields["listing_count"].as_u64(), Some(1));
    }

    #[test]
    fn test_hq_only_without_hq_listings_has_no_price() {
        let payload = json!({ "listings": [{ "pricePerUnit": 10, "hq": false }] });

        let fields = LowestListing::hq_only().format(&payload).unwrap();

        assert!(fields.get("price").is_none());
        assert_eq!(fields["listing_count"].as_u64(), Some(0));
    }

    #[test]
    fn test_malformed_listing_is_a_format_error() {
        let payload = json!({ "listings": [{ "quantity": 1 }] });

        let result = LowestListing::new().format(&payload);

        assert!(matches!(result, Err(PriceError::Format(_))));
    }

    #[test]
    fn test_closure_formatter() {
        let formatter = |payload: &Value| -> Result<RecordFields> {
            let mut fields = RecordFields::new();
            fields.insert("seen".to_string(), payload["itemID"].clone());
            Ok(fields)
        };

        let fields = formatter.format(&payload()).unwrap();

        assert_eq!(fields["seen"], json!(5057));
    }
}
