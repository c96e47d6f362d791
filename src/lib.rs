//! Multilingual real-estate listings: fetched from an upstream API, merged
//! across locales, given stable slugs and served from an in-memory cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod mapping;
pub mod models;
pub mod slug;
pub mod upstream;

pub use cache::{ListingsCache, Snapshot, SyncReport, SyncStats};
pub use config::{ApiSettings, CacheSettings, Settings};
pub use error::{LocaleFailure, SyncError};
pub use models::{CacheStatus, FlattenedListing, Locale, MultilingualListing};
pub use upstream::{ApiClient, ListingSource};
