use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::MultilingualListing;

/// Immutable published view of all listings.
///
/// Built once per successful refresh and swapped in whole; the indexes are
/// derived from `listings` and never mutated afterwards.
#[derive(Debug, Default)]
pub struct Snapshot {
    listings: Vec<Arc<MultilingualListing>>,
    slug_index: HashMap<String, usize>,
    id_index: HashMap<String, usize>,
    built_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The snapshot served before the first successful sync
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the snapshot and its indexes. Listings must already carry
    /// unique slugs.
    pub fn build(listings: Vec<MultilingualListing>, built_at: DateTime<Utc>) -> Self {
        let listings: Vec<Arc<MultilingualListing>> = listings.into_iter().map(Arc::new).collect();
        let slug_index = listings
            .iter()
            .enumerate()
            .map(|(i, l)| (l.slug.clone(), i))
            .collect();
        let id_index = listings
            .iter()
            .enumerate()
            .map(|(i, l)| (l.id.clone(), i))
            .collect();

        Self {
            listings,
            slug_index,
            id_index,
            built_at: Some(built_at),
        }
    }

    pub fn listings(&self) -> &[Arc<MultilingualListing>] {
        &self.listings
    }

    pub fn by_slug(&self, slug: &str) -> Option<&Arc<MultilingualListing>> {
        self.slug_index.get(slug).map(|&i| &self.listings[i])
    }

    pub fn by_id(&self, id: &str) -> Option<&Arc<MultilingualListing>> {
        self.id_index.get(id).map(|&i| &self.listings[i])
    }

    pub fn slug_count(&self) -> usize {
        self.slug_index.len()
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }
}
