use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::models::{CacheStatus, FlattenedListing};

const UNKNOWN_STATUS: &str = "unknown";

/// Payload for a sync-status endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub status: CacheStatus,
    pub total: usize,
    /// Listing count per upstream status value
    pub by_status: BTreeMap<String, usize>,
    pub for_sale: usize,
    pub for_rent: usize,
    /// Newest listings first, by publication date
    pub recent: Vec<RecentListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentListing {
    pub id: String,
    pub slug: String,
    pub address: Option<String>,
    pub published_at: Option<String>,
}

impl SyncStats {
    pub fn compute(status: CacheStatus, listings: &[FlattenedListing], recent_limit: usize) -> Self {
        let mut by_status = BTreeMap::new();
        for listing in listings {
            let key = listing
                .status
                .clone()
                .unwrap_or_else(|| UNKNOWN_STATUS.to_string());
            *by_status.entry(key).or_insert(0) += 1;
        }
        let for_rent = listings.iter().filter(|l| l.is_rental()).count();

        let mut dated: Vec<(Option<DateTime<Utc>>, &FlattenedListing)> = listings
            .iter()
            .map(|l| (l.published_at.as_deref().and_then(parse_published), l))
            .collect();
        // newest first; undated and unparseable dates go last
        dated.sort_by(|a, b| b.0.cmp(&a.0));
        let recent = dated
            .into_iter()
            .take(recent_limit)
            .map(|(_, l)| RecentListing {
                id: l.id.clone(),
                slug: l.slug.clone(),
                address: l.address.clone(),
                published_at: l.published_at.clone(),
            })
            .collect();

        Self {
            status,
            total: listings.len(),
            by_status,
            for_sale: listings.len() - for_rent,
            for_rent,
            recent,
        }
    }
}

/// Publication dates as the provider writes them: RFC 3339, bare ISO
/// date-times and dates, or Finnish `d.m.yyyy`.
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%d.%m.%Y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}
