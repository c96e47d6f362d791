use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use listings_sync::mapping::{ListingMapper, MappedListing, MultilingualMapper, RawByLocale};
use listings_sync::models::RawListing;
use listings_sync::{CacheSettings, ListingSource, ListingsCache, Locale, SyncError};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

#[derive(Clone)]
enum Reply {
    Listings(Vec<RawListing>),
    Fail(SyncError),
    Hang,
}

/// In-memory upstream with per-locale replies, call counters and an
/// optional gate that holds every fetch until released.
struct FakeSource {
    replies: Mutex<HashMap<Locale, Reply>>,
    calls: Mutex<HashMap<Locale, usize>>,
    gate: Option<Semaphore>,
}

impl FakeSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            gate: None,
        })
    }

    fn gated() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            gate: Some(Semaphore::new(0)),
        })
    }

    fn reply(&self, locale: Locale, reply: Reply) {
        self.replies.lock().unwrap().insert(locale, reply);
    }

    fn reply_all(&self, listings: Vec<RawListing>) {
        for locale in Locale::ALL {
            self.reply(locale, Reply::Listings(listings.clone()));
        }
    }

    fn calls(&self, locale: Locale) -> usize {
        self.calls.lock().unwrap().get(&locale).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl ListingSource for FakeSource {
    async fn fetch_listings(&self, locale: Locale) -> Result<Vec<RawListing>, SyncError> {
        *self.calls.lock().unwrap().entry(locale).or_default() += 1;

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&locale)
            .cloned()
            .unwrap_or(Reply::Listings(Vec::new()));
        match reply {
            Reply::Listings(listings) => Ok(listings),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        }
    }

    fn source_name(&self) -> &'static str {
        "fake"
    }
}

/// Delegates to the real mapper until told to blow up
#[derive(Default)]
struct FlakyMapper {
    explode: AtomicBool,
}

impl ListingMapper for FlakyMapper {
    fn map(&self, id: &str, raw_by_locale: &RawByLocale<'_>) -> MappedListing {
        if self.explode.load(Ordering::SeqCst) {
            panic!("mapper exploded on listing {id}");
        }
        MultilingualMapper.map(id, raw_by_locale)
    }
}

fn raw(value: Value) -> RawListing {
    value.as_object().cloned().unwrap()
}

fn listing(id: &str, address: &str, postal_code: &str) -> RawListing {
    raw(json!({
        "id": id,
        "address": address,
        "postalCode": postal_code,
        "city": "Helsinki",
        "debtFreePrice": "185 000",
        "status": "myynnissä",
    }))
}

fn settings() -> CacheSettings {
    CacheSettings {
        fetch_timeout: Duration::from_secs(5),
        ..CacheSettings::default()
    }
}

fn cache_for(source: &Arc<FakeSource>) -> ListingsCache {
    ListingsCache::new(source.clone(), settings())
}

#[tokio::test]
async fn concurrent_syncs_share_one_upstream_call_per_locale() {
    let source = FakeSource::gated();
    source.reply_all(vec![listing("1", "Rantatie 7", "02100")]);
    let cache = cache_for(&source);

    let (a, b, c, _) = tokio::join!(
        cache.sync_listings(),
        cache.sync_listings(),
        cache.sync_listings(),
        async { source.release() },
    );

    for locale in Locale::ALL {
        assert_eq!(source.calls(locale), 1, "{locale} fetched more than once");
    }
    assert!(a.is_success());
    assert_eq!(a.status, b.status);
    assert_eq!(b.status, c.status);
    assert_eq!(cache.get_status().listings_count, 1);
}

#[tokio::test]
async fn sequential_syncs_each_hit_upstream() {
    let source = FakeSource::new();
    source.reply_all(vec![listing("1", "Rantatie 7", "02100")]);
    let cache = cache_for(&source);

    cache.sync_listings().await;
    cache.sync_listings().await;

    assert_eq!(source.total_calls(), 2 * Locale::ALL.len());
}

#[tokio::test]
async fn failed_sync_keeps_previous_listings() {
    let source = FakeSource::new();
    source.reply_all(vec![
        listing("1", "Rantatie 7", "02100"),
        listing("2", "Kauppakatu 3", "40100"),
    ]);
    let cache = cache_for(&source);
    assert!(cache.sync_listings().await.is_success());
    let before = cache.get_listings(Locale::Fi);

    source.reply(
        Locale::Fi,
        Reply::Fail(SyncError::transport(Some(503), "service unavailable")),
    );
    let report = cache.sync_listings().await;

    assert!(matches!(report.error, Some(SyncError::Transport { status: Some(503), .. })));
    assert_eq!(cache.get_listings(Locale::Fi), before);
    let status = cache.get_status();
    assert_eq!(status.listings_count, 2);
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.last_error.unwrap().kind, "transport");
    assert!(status.last_sync_time.is_some());
    assert_eq!(status.last_sync_time, cache.snapshot().built_at());
}

#[tokio::test]
async fn mapper_panic_keeps_snapshot_and_frees_the_next_sync() {
    let source = FakeSource::new();
    source.reply_all(vec![listing("1", "Rantatie 7", "02100")]);
    let mapper = Arc::new(FlakyMapper::default());
    let cache = ListingsCache::with_mapper(source.clone(), mapper.clone(), settings());
    assert!(cache.sync_listings().await.is_success());

    mapper.explode.store(true, Ordering::SeqCst);
    let report = cache.sync_listings().await;

    assert!(matches!(report.error, Some(SyncError::Internal(_))));
    let status = cache.get_status();
    assert_eq!(status.listings_count, 1);
    assert_eq!(status.last_error.unwrap().kind, "internal");
    assert!(cache.get_converted_listing_by_slug("rantatie-7", Locale::Fi).is_some());

    mapper.explode.store(false, Ordering::SeqCst);
    let calls_before = source.total_calls();
    assert!(cache.sync_listings().await.is_success());
    assert_eq!(source.total_calls(), calls_before + Locale::ALL.len());
    assert_eq!(cache.get_status().consecutive_failures, 0);
}

#[tokio::test]
async fn every_slug_resolves_to_its_listing() {
    let source = FakeSource::new();
    source.reply_all(vec![
        listing("1", "Rantatie 7", "02100"),
        listing("2", "Kauppakatu 3", "40100"),
        listing("3", "Kauppakatu 3", "40100"),
        listing("4", "", "00100"),
    ]);
    let cache = cache_for(&source);
    cache.sync_listings().await;

    let listings = cache.get_multilingual_listings();
    let slugs: HashSet<&str> = listings.iter().map(|l| l.slug.as_str()).collect();
    assert_eq!(slugs.len(), listings.len());
    assert_eq!(cache.snapshot().slug_count(), listings.len());

    for listing in &listings {
        let view = cache
            .get_converted_listing_by_slug(&listing.slug, Locale::Sv)
            .unwrap();
        assert_eq!(view.id, listing.id);
    }
    assert!(cache.get_converted_listing_by_slug("no-such-slug", Locale::Fi).is_none());
}

#[tokio::test]
async fn duplicate_mannerheimintie_addresses_are_disambiguated() {
    let source = FakeSource::new();
    source.reply_all(vec![
        listing("a", "Mannerheimintie 1", "00100"),
        listing("b", "Mannerheimintie 1", "00250"),
    ]);
    let cache = cache_for(&source);
    cache.sync_listings().await;

    let a = cache.get_listing_by_id("a").unwrap();
    let b = cache.get_listing_by_id("b").unwrap();
    assert_eq!(a.slug, "mannerheimintie-1");
    assert_eq!(b.slug, "mannerheimintie-1-00250");
    assert_eq!(cache.get_status().slug_collisions, 1);
}

#[tokio::test]
async fn nested_duplicate_addresses_without_postal_code_get_a_random_suffix() {
    let source = FakeSource::new();
    source.reply(
        Locale::Fi,
        Reply::Listings(vec![
            raw(json!({ "id": "a", "address": { "fi": { "value": "Mannerheimintie 1" } } })),
            raw(json!({ "id": "b", "address": { "fi": { "value": "Mannerheimintie 1" } } })),
        ]),
    );
    let cache = cache_for(&source);
    cache.sync_listings().await;

    assert_eq!(cache.get_listing_by_id("a").unwrap().slug, "mannerheimintie-1");
    let b_slug = cache.get_listing_by_id("b").unwrap().slug.clone();
    let suffix = b_slug.strip_prefix("mannerheimintie-1-").unwrap();
    assert_eq!(suffix.len(), 6);
    assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

    assert!(cache.sync_listings().await.is_success());
    assert_eq!(cache.get_listing_by_id("a").unwrap().slug, "mannerheimintie-1");
    assert_eq!(cache.get_listing_by_id("b").unwrap().slug, b_slug);
}

#[tokio::test]
async fn slugs_survive_reordering_between_syncs() {
    let source = FakeSource::new();
    source.reply_all(vec![
        listing("a", "Mannerheimintie 1", "00100"),
        listing("b", "Mannerheimintie 1", "00250"),
    ]);
    let cache = cache_for(&source);
    cache.sync_listings().await;

    source.reply_all(vec![
        listing("b", "Mannerheimintie 1", "00250"),
        listing("c", "Rantatie 7", "02100"),
        listing("a", "Mannerheimintie 1", "00100"),
    ]);
    cache.sync_listings().await;

    assert_eq!(cache.get_listing_by_id("a").unwrap().slug, "mannerheimintie-1");
    assert_eq!(cache.get_listing_by_id("b").unwrap().slug, "mannerheimintie-1-00250");
    assert_eq!(cache.get_listing_by_id("c").unwrap().slug, "rantatie-7");
}

#[tokio::test]
async fn finnish_only_price_reaches_english_view() {
    let source = FakeSource::new();
    source.reply(Locale::Fi, Reply::Listings(vec![listing("1", "Rantatie 7", "02100")]));
    source.reply(
        Locale::En,
        Reply::Listings(vec![raw(json!({ "id": "1", "description": "Sea view" }))]),
    );
    let cache = cache_for(&source);
    cache.sync_listings().await;

    let en = cache.get_listings(Locale::En);
    assert_eq!(en[0].debt_free_price, Some(185000.0));
    assert_eq!(en[0].description.as_deref(), Some("Sea view"));
    assert_eq!(en[0].locale, Locale::En);
    assert_eq!(cache.get_listings(Locale::Fi), cache.get_listings(Locale::Fi));
}

#[tokio::test]
async fn failed_secondary_locale_is_a_partial_failure() {
    let source = FakeSource::new();
    source.reply_all(vec![listing("1", "Rantatie 7", "02100")]);
    source.reply(Locale::Sv, Reply::Fail(SyncError::transport(Some(500), "boom")));
    let cache = cache_for(&source);

    let report = cache.sync_listings().await;

    assert!(report.is_success());
    assert_eq!(report.status.listings_count, 1);
    assert_eq!(report.status.failed_locales.len(), 1);
    assert_eq!(report.status.failed_locales[0].locale, Locale::Sv);
    assert!(report.status.last_error.is_none());
    let sv = cache.get_converted_listing_by_slug("rantatie-7", Locale::Sv).unwrap();
    assert_eq!(sv.address.as_deref(), Some("Rantatie 7"));
}

#[tokio::test(start_paused = true)]
async fn hanging_locale_times_out() {
    let source = FakeSource::new();
    source.reply_all(vec![listing("1", "Rantatie 7", "02100")]);
    source.reply(Locale::En, Reply::Hang);
    let cache = cache_for(&source);

    let report = cache.sync_listings().await;

    assert!(report.is_success());
    assert_eq!(report.status.failed_locales[0].locale, Locale::En);
    assert!(report.status.failed_locales[0].message.contains("timed out"));
}

#[tokio::test]
async fn init_surfaces_configuration_errors() {
    let source = FakeSource::new();
    for locale in Locale::ALL {
        source.reply(locale, Reply::Fail(SyncError::config("LISTINGS_API_KEY must be set")));
    }
    let cache = cache_for(&source);

    let err = cache.init().await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn init_records_transport_errors_without_failing() {
    let source = FakeSource::new();
    source.reply(Locale::Fi, Reply::Fail(SyncError::transport(None, "connection refused")));
    let cache = cache_for(&source);

    let status = cache.init().await.unwrap();
    assert_eq!(status.listings_count, 0);
    assert!(status.needs_refresh);
    assert_eq!(status.last_error.unwrap().kind, "transport");
}

#[tokio::test]
async fn empty_upstream_does_not_wipe_listings() {
    let source = FakeSource::new();
    source.reply_all(vec![listing("1", "Rantatie 7", "02100")]);
    let cache = cache_for(&source);
    cache.sync_listings().await;

    source.reply_all(Vec::new());
    let report = cache.sync_listings().await;

    assert_eq!(report.error, Some(SyncError::EmptyResult { previous: 1 }));
    assert_eq!(cache.get_status().listings_count, 1);
}

#[tokio::test]
async fn empty_upstream_is_published_when_allowed() {
    let source = FakeSource::new();
    source.reply_all(vec![listing("1", "Rantatie 7", "02100")]);
    let cache = ListingsCache::new(
        source.clone(),
        CacheSettings {
            allow_empty_snapshot: true,
            ..settings()
        },
    );
    cache.sync_listings().await;

    source.reply_all(Vec::new());
    assert!(cache.sync_listings().await.is_success());
    assert_eq!(cache.get_status().listings_count, 0);
}

#[tokio::test(start_paused = true)]
async fn auto_sync_runs_after_one_interval() {
    let source = FakeSource::new();
    source.reply_all(vec![listing("1", "Rantatie 7", "02100")]);
    let cache = cache_for(&source);

    cache.start_auto_sync().unwrap();
    cache.start_auto_sync().unwrap();
    assert!(cache.get_status().auto_sync_active);

    tokio::time::sleep(Duration::from_secs(599)).await;
    assert_eq!(source.total_calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.total_calls(), Locale::ALL.len());
    assert_eq!(cache.get_status().listings_count, 1);

    cache.dispose();
    assert!(!cache.get_status().auto_sync_active);
    tokio::time::sleep(Duration::from_secs(1200)).await;
    assert_eq!(source.total_calls(), Locale::ALL.len());
}

#[tokio::test]
async fn stats_split_sale_and_rent() {
    let source = FakeSource::new();
    let mut rental = listing("2", "Kauppakatu 3", "40100");
    rental.insert("rent".into(), json!("950 €/kk"));
    source.reply_all(vec![listing("1", "Rantatie 7", "02100"), rental]);
    let cache = cache_for(&source);
    cache.sync_listings().await;

    let stats = cache.stats(Locale::Fi, 10);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.for_rent, 1);
    assert_eq!(stats.for_sale, 1);
    assert_eq!(stats.by_status["myynnissä"], 2);
    assert_eq!(stats.status.listings_count, 2);
}
