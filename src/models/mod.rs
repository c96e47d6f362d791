mod raw;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LocaleFailure;

pub use raw::{RawField, RawListing};

/// Languages listing content can be authored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Fi,
    Sv,
    En,
}

impl Locale {
    /// Every supported locale, in fallback order
    pub const ALL: [Locale; 3] = [Locale::Fi, Locale::Sv, Locale::En];

    /// The mandatory locale: a sync without it fails
    pub const DEFAULT: Locale = Locale::Fi;

    pub fn code(self) -> &'static str {
        match self {
            Locale::Fi => "fi",
            Locale::Sv => "sv",
            Locale::En => "en",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "fi" => Some(Locale::Fi),
            "sv" => Some(Locale::Sv),
            "en" => Some(Locale::En),
            _ => None,
        }
    }

    /// `self → fi → sv → en`, without repeats
    pub fn fallback_chain(self) -> Vec<Locale> {
        let mut chain = vec![self];
        chain.extend(Self::ALL.into_iter().filter(|l| *l != self));
        chain
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| format!("unsupported locale '{s}'"))
    }
}

/// One value per locale; `None` means the provider did not supply it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Localized<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fi: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sv: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<T>,
}

impl<T> Default for Localized<T> {
    fn default() -> Self {
        Self {
            fi: None,
            sv: None,
            en: None,
        }
    }
}

impl<T> Localized<T> {
    pub fn get(&self, locale: Locale) -> Option<&T> {
        match locale {
            Locale::Fi => self.fi.as_ref(),
            Locale::Sv => self.sv.as_ref(),
            Locale::En => self.en.as_ref(),
        }
    }

    pub fn set(&mut self, locale: Locale, value: Option<T>) {
        let slot = match locale {
            Locale::Fi => &mut self.fi,
            Locale::Sv => &mut self.sv,
            Locale::En => &mut self.en,
        };
        *slot = value;
    }

    pub fn is_empty(&self) -> bool {
        self.fi.is_none() && self.sv.is_none() && self.en.is_none()
    }

    /// Walk the fallback chain for `locale` and return the first value that
    /// `pick` accepts.
    pub fn resolve_with<U>(&self, locale: Locale, pick: impl Fn(&T) -> Option<U>) -> Option<U> {
        locale
            .fallback_chain()
            .into_iter()
            .filter_map(|l| self.get(l))
            .find_map(pick)
    }
}

/// How a field's value should be interpreted once flattened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Money; zero and sentinels mean "no value"
    Amount,
    Number,
    Media,
}

/// Every localizable attribute tracked from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Address,
    PostalCode,
    City,
    District,
    Description,
    Status,
    ListingType,
    DebtFreePrice,
    SalesPrice,
    Rent,
    LivingArea,
    Rooms,
    YearBuilt,
    Floor,
    Latitude,
    Longitude,
    Images,
    VirtualTour,
    AgentName,
    AgentEmail,
    AgentPhone,
    PublishedAt,
}

impl Field {
    pub const ALL: [Field; 22] = [
        Field::Address,
        Field::PostalCode,
        Field::City,
        Field::District,
        Field::Description,
        Field::Status,
        Field::ListingType,
        Field::DebtFreePrice,
        Field::SalesPrice,
        Field::Rent,
        Field::LivingArea,
        Field::Rooms,
        Field::YearBuilt,
        Field::Floor,
        Field::Latitude,
        Field::Longitude,
        Field::Images,
        Field::VirtualTour,
        Field::AgentName,
        Field::AgentEmail,
        Field::AgentPhone,
        Field::PublishedAt,
    ];

    /// Keys the provider has been seen using for this field, preferred first
    pub fn raw_keys(self) -> &'static [&'static str] {
        match self {
            Field::Address => &["address", "streetAddress"],
            Field::PostalCode => &["postalCode", "postal_code", "zipCode"],
            Field::City => &["city", "municipality"],
            Field::District => &["district", "neighbourhood"],
            Field::Description => &["description", "marketingDescription"],
            Field::Status => &["status", "listingStatus"],
            Field::ListingType => &["listingType", "productGroup", "type"],
            Field::DebtFreePrice => &["debtFreePrice", "debt_free_price"],
            Field::SalesPrice => &["salesPrice", "sales_price", "price"],
            Field::Rent => &["rent", "rentAmount", "monthlyRent"],
            Field::LivingArea => &["livingArea", "living_area", "area"],
            Field::Rooms => &["rooms", "roomTypes", "roomCount"],
            Field::YearBuilt => &["yearBuilt", "constructionYear"],
            Field::Floor => &["floor", "floorLocation"],
            Field::Latitude => &["latitude", "lat"],
            Field::Longitude => &["longitude", "lng", "lon"],
            Field::Images => &["images", "photos"],
            Field::VirtualTour => &["virtualPresentation", "virtualTour"],
            Field::AgentName => &["realtorName", "agentName"],
            Field::AgentEmail => &["realtorEmail", "agentEmail"],
            Field::AgentPhone => &["realtorPhone", "agentPhone"],
            Field::PublishedAt => &["publishDate", "publishedAt", "createdAt"],
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::DebtFreePrice | Field::SalesPrice | Field::Rent => FieldKind::Amount,
            Field::LivingArea | Field::YearBuilt | Field::Latitude | Field::Longitude => {
                FieldKind::Number
            }
            Field::Images => FieldKind::Media,
            _ => FieldKind::Text,
        }
    }
}

/// Canonical listing record: one per upstream id, all locales merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultilingualListing {
    pub id: String,
    /// Assigned during refresh; empty until then
    pub slug: String,
    pub fields: BTreeMap<Field, Localized<Value>>,
}

impl MultilingualListing {
    /// A listing with every schema field present but empty
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slug: String::new(),
            fields: Field::ALL.iter().map(|f| (*f, Localized::default())).collect(),
        }
    }

    pub fn field(&self, field: Field) -> Option<&Localized<Value>> {
        self.fields.get(&field)
    }

    pub fn value(&self, field: Field, locale: Locale) -> Option<&Value> {
        self.field(field).and_then(|l| l.get(locale))
    }

    pub fn set_value(&mut self, field: Field, locale: Locale, value: Option<Value>) {
        self.fields.entry(field).or_default().set(locale, value);
    }
}

/// Agent contact details in a flattened view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Single-locale projection of a [`MultilingualListing`]
///
/// Every field is always serialized; missing data shows up as `null` or an
/// empty list so consumers get a stable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenedListing {
    pub id: String,
    pub slug: String,
    pub locale: Locale,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub listing_type: Option<String>,
    pub debt_free_price: Option<f64>,
    pub sales_price: Option<f64>,
    pub rent: Option<f64>,
    pub living_area: Option<f64>,
    pub rooms: Option<String>,
    pub year_built: Option<i32>,
    pub floor: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub images: Vec<String>,
    pub virtual_tour: Option<String>,
    pub agent: AgentView,
    pub published_at: Option<String>,
}

impl FlattenedListing {
    /// Rental listings carry a real rent amount
    pub fn is_rental(&self) -> bool {
        self.rent.is_some()
    }
}

/// A failure that was swallowed to keep serving the last good snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedError {
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Observable cache state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub listings_count: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub auto_sync_active: bool,
    /// No snapshot yet, or the snapshot is older than the freshness window
    pub needs_refresh: bool,
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub last_error: Option<RecordedError>,
    pub failed_locales: Vec<LocaleFailure>,
    pub consecutive_failures: u32,
    pub mapping_anomalies: usize,
    pub slug_collisions: usize,
}
