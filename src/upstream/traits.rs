use async_trait::async_trait;

use crate::error::SyncError;
use crate::models::{Locale, RawListing};

/// Common trait for listing sources.
/// The cache only talks to this, so tests can swap in a fake provider.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch every raw listing the provider has in `locale`
    async fn fetch_listings(&self, locale: Locale) -> Result<Vec<RawListing>, SyncError>;

    /// Get the name of the listing source
    fn source_name(&self) -> &'static str;
}
