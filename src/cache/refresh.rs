use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::snapshot::Snapshot;
use crate::config::CacheSettings;
use crate::error::{LocaleFailure, SyncError};
use crate::mapping::{flatten, listing_id, ListingMapper, RawByLocale};
use crate::models::{FlattenedListing, Locale, MultilingualListing, RawListing};
use crate::slug::{self, SlugCollision, SlugContext};
use crate::upstream::ListingSource;

/// Everything one successful refresh produced
#[derive(Debug)]
pub struct RefreshOutcome {
    pub snapshot: Snapshot,
    pub failed_locales: Vec<LocaleFailure>,
    pub anomalies: usize,
    pub collisions: Vec<SlugCollision>,
}

/// One refresh cycle: fetch, merge, map, slug, index.
///
/// Nothing is published here; the caller swaps the returned snapshot in.
pub async fn run(
    source: &dyn ListingSource,
    mapper: &dyn ListingMapper,
    settings: &CacheSettings,
    previous: &Snapshot,
) -> Result<RefreshOutcome, SyncError> {
    let (responses, failed_locales) = fetch_all(source, settings).await?;

    let grouped = group_by_id(&responses, settings.default_locale);
    let mut anomalies = 0;
    let mut listings: Vec<MultilingualListing> = grouped
        .iter()
        .map(|(id, raw_by_locale)| {
            let mapped = mapper.map(id, raw_by_locale);
            anomalies += mapped.anomalies.len();
            mapped.listing
        })
        .collect();

    if listings.is_empty() && !previous.is_empty() && !settings.allow_empty_snapshot {
        return Err(SyncError::EmptyResult {
            previous: previous.len(),
        });
    }

    let collisions = assign_slugs(&mut listings, previous, settings.default_locale);
    let snapshot = Snapshot::build(listings, Utc::now());

    info!(
        "Mapped {} listings ({} anomalies, {} slug collisions)",
        snapshot.len(),
        anomalies,
        collisions.len()
    );

    Ok(RefreshOutcome {
        snapshot,
        failed_locales,
        anomalies,
        collisions,
    })
}

/// Fetch every configured locale concurrently.
///
/// A failing default locale or any configuration problem fails the cycle;
/// other locales degrade to a [`LocaleFailure`].
async fn fetch_all(
    source: &dyn ListingSource,
    settings: &CacheSettings,
) -> Result<(BTreeMap<Locale, Vec<RawListing>>, Vec<LocaleFailure>), SyncError> {
    let results = join_all(settings.locales.iter().map(|&locale| async move {
        (locale, fetch_locale(source, locale, settings.fetch_timeout).await)
    }))
    .await;

    let mut responses = BTreeMap::new();
    let mut failed = Vec::new();
    let mut fatal = None;

    for (locale, result) in results {
        match result {
            Ok(listings) => {
                debug!("{}: {} raw listings from {}", locale, listings.len(), source.source_name());
                responses.insert(locale, listings);
            }
            Err(err) if err.is_configuration() || locale == settings.default_locale => {
                warn!("❌ Fetching {} failed: {}", locale, err);
                // configuration problems win over transport ones
                if fatal.as_ref().map_or(true, |f: &SyncError| !f.is_configuration()) {
                    fatal = Some(err);
                }
            }
            Err(err) => {
                warn!("⚠️  Fetching {} failed, continuing without it: {}", locale, err);
                failed.push(LocaleFailure::new(locale, &err));
            }
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok((responses, failed)),
    }
}

async fn fetch_locale(
    source: &dyn ListingSource,
    locale: Locale,
    limit: Duration,
) -> Result<Vec<RawListing>, SyncError> {
    match tokio::time::timeout(limit, source.fetch_listings(locale)).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::transport(
            None,
            format!("{locale} fetch timed out after {}s", limit.as_secs()),
        )),
    }
}

/// Merge per-locale responses into one entry per id.
///
/// Order follows the default locale's response, then ids only seen in other
/// locales in order of first appearance. Within one locale the first record
/// for an id wins.
fn group_by_id(
    responses: &BTreeMap<Locale, Vec<RawListing>>,
    default_locale: Locale,
) -> Vec<(String, RawByLocale<'_>)> {
    let order = std::iter::once(default_locale).chain(
        responses
            .keys()
            .copied()
            .filter(move |l| *l != default_locale),
    );

    let mut grouped: Vec<(String, RawByLocale<'_>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for locale in order {
        let Some(records) = responses.get(&locale) else {
            continue;
        };
        for raw in records {
            let Some(id) = listing_id(raw) else {
                warn!(target: "data_quality", "{}: skipping listing without id", locale);
                continue;
            };
            let index = *positions.entry(id.clone()).or_insert_with(|| {
                grouped.push((id.clone(), BTreeMap::new()));
                grouped.len() - 1
            });
            let by_locale = &mut grouped[index].1;
            if by_locale.contains_key(&locale) {
                warn!(target: "data_quality", "{}: duplicate listing id {}, keeping the first", locale, id);
                continue;
            }
            by_locale.insert(locale, raw);
        }
    }

    grouped
}

/// Give every listing a unique slug.
///
/// Listings whose address is unchanged since the previous snapshot keep
/// their slug; the rest go through the resolver in listing order.
fn assign_slugs(
    listings: &mut [MultilingualListing],
    previous: &Snapshot,
    locale: Locale,
) -> Vec<SlugCollision> {
    let views: Vec<FlattenedListing> = listings.iter().map(|l| flatten(l, locale)).collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(listings.len());
    let mut pending = Vec::new();

    for (i, listing) in listings.iter_mut().enumerate() {
        let address = slug::normalize(views[i].address.as_deref().unwrap_or_default());
        let kept = previous
            .by_id(&listing.id)
            .filter(|prev| !prev.slug.is_empty() && !taken.contains(&prev.slug))
            .filter(|prev| {
                let prev_address = flatten(prev, locale).address.unwrap_or_default();
                slug::normalize(&prev_address) == address
            })
            .map(|prev| prev.slug.clone());

        match kept {
            Some(slug) => {
                taken.insert(slug.clone());
                listing.slug = slug;
            }
            None => pending.push(i),
        }
    }

    let mut collisions = Vec::new();
    for i in pending {
        let view = &views[i];
        let resolution = slug::resolve(
            view.address.as_deref().unwrap_or_default(),
            &SlugContext {
                postal_code: view.postal_code.as_deref(),
                city: view.city.as_deref(),
                existing: &taken,
            },
        );
        taken.insert(resolution.slug.clone());
        listings[i].slug = resolution.slug;
        collisions.extend(resolution.collisions);
    }

    collisions
}
