use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::mapping::sentinel::unknown_numeric_token;
use crate::models::{Field, FieldKind, Locale, MultilingualListing, RawField, RawListing};

/// Raw records for one listing id, keyed by the locale they were fetched in
pub type RawByLocale<'a> = BTreeMap<Locale, &'a RawListing>;

/// Something in a raw record we could not use as-is
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingAnomaly {
    pub listing_id: String,
    pub field: Field,
    pub locale: Locale,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "token")]
pub enum AnomalyKind {
    /// Object shape matching no known field layout; field treated as absent
    UnrecognizedShape,
    /// Non-numeric text in a numeric field that is not a known placeholder
    UnknownSentinel(String),
}

impl fmt::Display for MappingAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AnomalyKind::UnrecognizedShape => write!(
                f,
                "listing {} field {:?} ({}): unrecognized shape",
                self.listing_id, self.field, self.locale
            ),
            AnomalyKind::UnknownSentinel(token) => write!(
                f,
                "listing {} field {:?} ({}): unknown placeholder {:?}",
                self.listing_id, self.field, self.locale, token
            ),
        }
    }
}

/// Output of mapping one listing
#[derive(Debug, Clone)]
pub struct MappedListing {
    pub listing: MultilingualListing,
    pub anomalies: Vec<MappingAnomaly>,
}

/// Turns per-locale raw records into one multilingual record.
///
/// Implementations must not panic on malformed input.
pub trait ListingMapper: Send + Sync {
    fn map(&self, id: &str, raw_by_locale: &RawByLocale<'_>) -> MappedListing;
}

/// Default mapper: one extraction rule applied to every schema field
#[derive(Debug, Clone, Copy, Default)]
pub struct MultilingualMapper;

impl ListingMapper for MultilingualMapper {
    fn map(&self, id: &str, raw_by_locale: &RawByLocale<'_>) -> MappedListing {
        let mut listing = MultilingualListing::new(id);
        let mut anomalies = Vec::new();

        for field in Field::ALL {
            for (&locale, raw) in raw_by_locale {
                let raw_value = field
                    .raw_keys()
                    .iter()
                    .find_map(|key| raw.get(*key).filter(|v| !v.is_null()));
                let classified = RawField::classify(raw_value, locale);

                if classified.is_anomalous() {
                    let anomaly = MappingAnomaly {
                        listing_id: id.to_string(),
                        field,
                        locale,
                        kind: AnomalyKind::UnrecognizedShape,
                    };
                    warn!(target: "data_quality", "{}", anomaly);
                    anomalies.push(anomaly);
                    continue;
                }

                let value = classified.value().cloned();
                if matches!(field.kind(), FieldKind::Amount | FieldKind::Number) {
                    if let Some(token) = value.as_ref().and_then(unknown_numeric_token) {
                        let anomaly = MappingAnomaly {
                            listing_id: id.to_string(),
                            field,
                            locale,
                            kind: AnomalyKind::UnknownSentinel(token.to_string()),
                        };
                        warn!(target: "data_quality", "{}", anomaly);
                        anomalies.push(anomaly);
                    }
                }

                listing.set_value(field, locale, value);
            }
        }

        MappedListing { listing, anomalies }
    }
}

/// Upstream id of a raw record. Numbers are accepted and stringified.
pub fn listing_id(raw: &RawListing) -> Option<String> {
    match raw.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
