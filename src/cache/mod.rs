//! In-memory listings cache with single-flight refresh.
//!
//! Readers always see one complete snapshot together with the sync record
//! that produced it. Writers build a new state off to the side and publish
//! it with one pointer swap.

pub mod refresh;
pub mod scheduler;
pub mod snapshot;
pub mod stats;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::config::CacheSettings;
use crate::error::{LocaleFailure, SyncError};
use crate::mapping::{flatten, ListingMapper, MultilingualMapper};
use crate::models::{CacheStatus, FlattenedListing, Locale, MultilingualListing, RecordedError};
use crate::upstream::ListingSource;

pub use refresh::RefreshOutcome;
pub use scheduler::AutoSyncScheduler;
pub use snapshot::Snapshot;
pub use stats::{RecentListing, SyncStats};

/// Result of one sync cycle, shared by every caller that joined it
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub status: CacheStatus,
    /// `None` when the cycle published a new snapshot
    pub error: Option<SyncError>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Bookkeeping published together with each snapshot
#[derive(Debug, Clone, Default)]
struct SyncRecord {
    last_attempt_time: Option<DateTime<Utc>>,
    last_error: Option<RecordedError>,
    /// From the last successful cycle
    failed_locales: Vec<LocaleFailure>,
    consecutive_failures: u32,
    mapping_anomalies: usize,
    slug_collisions: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: Arc<Snapshot>,
    record: SyncRecord,
}

type InFlight = Shared<BoxFuture<'static, SyncReport>>;

struct CacheInner {
    source: Arc<dyn ListingSource>,
    mapper: Arc<dyn ListingMapper>,
    settings: CacheSettings,
    state: ArcSwap<CacheState>,
    in_flight: Mutex<Option<InFlight>>,
    scheduler: AutoSyncScheduler,
}

/// Cheap to clone; clones share one cache
#[derive(Clone)]
pub struct ListingsCache {
    inner: Arc<CacheInner>,
}

impl ListingsCache {
    pub fn new(source: Arc<dyn ListingSource>, settings: CacheSettings) -> Self {
        Self::with_mapper(source, Arc::new(MultilingualMapper), settings)
    }

    pub fn with_mapper(
        source: Arc<dyn ListingSource>,
        mapper: Arc<dyn ListingMapper>,
        settings: CacheSettings,
    ) -> Self {
        let scheduler = AutoSyncScheduler::new(settings.sync_interval);
        Self {
            inner: Arc::new(CacheInner {
                source,
                mapper,
                settings,
                state: ArcSwap::from_pointee(CacheState::default()),
                in_flight: Mutex::new(None),
                scheduler,
            }),
        }
    }

    /// First population.
    ///
    /// Fails only on a configuration problem while nothing has ever been
    /// published; any other failure is recorded in the returned status.
    pub async fn init(&self) -> Result<CacheStatus, SyncError> {
        let report = self.sync_listings().await;
        match report.error {
            Some(err) if err.is_configuration() && report.status.last_sync_time.is_none() => {
                error!("Listings cache cannot start: {}", err);
                Err(err)
            }
            _ => Ok(report.status),
        }
    }

    /// Run one refresh cycle, or join the one already running.
    ///
    /// The refresh runs on its own task, so dropping this future does not
    /// cancel it.
    pub async fn sync_listings(&self) -> SyncReport {
        self.in_flight_refresh().await
    }

    fn in_flight_refresh(&self) -> InFlight {
        let mut slot = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = slot.as_ref() {
            debug!("Joining in-flight sync");
            return running.clone();
        }

        let inner = Arc::clone(&self.inner);
        let refresh = async move {
            let report = match AssertUnwindSafe(inner.refresh_once()).catch_unwind().await {
                Ok(report) => report,
                Err(_) => inner.record_failure(SyncError::Internal("refresh task panicked".into())),
            };
            *inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = None;
            report
        }
        .boxed()
        .shared();

        *slot = Some(refresh.clone());
        drop(slot);

        tokio::spawn(refresh.clone());
        refresh
    }

    pub fn get_status(&self) -> CacheStatus {
        self.inner.status_at(Utc::now())
    }

    /// Last published snapshot, empty before the first successful sync
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.state.load().snapshot)
    }

    pub fn get_multilingual_listings(&self) -> Vec<Arc<MultilingualListing>> {
        self.snapshot().listings().to_vec()
    }

    pub fn get_listings(&self, locale: Locale) -> Vec<FlattenedListing> {
        self.snapshot()
            .listings()
            .iter()
            .map(|listing| flatten(listing, locale))
            .collect()
    }

    pub fn get_converted_listing_by_slug(&self, slug: &str, locale: Locale) -> Option<FlattenedListing> {
        self.snapshot()
            .by_slug(slug)
            .map(|listing| flatten(listing, locale))
    }

    pub fn get_listing_by_id(&self, id: &str) -> Option<Arc<MultilingualListing>> {
        self.snapshot().by_id(id).cloned()
    }

    pub fn stats(&self, locale: Locale, recent_limit: usize) -> SyncStats {
        SyncStats::compute(self.get_status(), &self.get_listings(locale), recent_limit)
    }

    /// Start periodic syncing. Calling it again while running is a no-op.
    pub fn start_auto_sync(&self) -> Result<(), SyncError> {
        let cache = Arc::downgrade(&self.inner);
        self.inner.scheduler.start(move || {
            let inner = cache.upgrade()?;
            Some(async move { ListingsCache { inner }.sync_listings().await })
        })?;
        Ok(())
    }

    pub fn stop_auto_sync(&self) {
        self.inner.scheduler.stop();
    }

    /// Stop background work. An in-flight refresh still completes.
    pub fn dispose(&self) {
        self.stop_auto_sync();
        info!("Listings cache disposed");
    }
}

impl CacheInner {
    async fn refresh_once(&self) -> SyncReport {
        let previous = self.state.load_full();
        info!(
            "🔄 Syncing listings from {} ({:?})",
            self.source.source_name(),
            self.settings.locales
        );

        match refresh::run(
            self.source.as_ref(),
            self.mapper.as_ref(),
            &self.settings,
            &previous.snapshot,
        )
        .await
        {
            Ok(outcome) => self.publish(outcome, &previous.record),
            Err(err) => self.record_failure(err),
        }
    }

    fn publish(&self, outcome: RefreshOutcome, previous: &SyncRecord) -> SyncReport {
        let now = outcome.snapshot.built_at().unwrap_or_else(Utc::now);
        let record = SyncRecord {
            last_attempt_time: Some(now),
            last_error: None,
            failed_locales: outcome.failed_locales,
            consecutive_failures: 0,
            mapping_anomalies: outcome.anomalies,
            slug_collisions: outcome.collisions.len(),
        };
        if previous.consecutive_failures > 0 {
            info!("Recovered after {} failed syncs", previous.consecutive_failures);
        }
        info!("✅ Published {} listings", outcome.snapshot.len());

        self.state.store(Arc::new(CacheState {
            snapshot: Arc::new(outcome.snapshot),
            record,
        }));
        SyncReport {
            status: self.status_at(now),
            error: None,
        }
    }

    /// Keep the current snapshot and note why the cycle failed
    fn record_failure(&self, err: SyncError) -> SyncReport {
        let now = Utc::now();
        let current = self.state.load_full();
        let mut record = current.record.clone();
        record.last_attempt_time = Some(now);
        record.consecutive_failures += 1;
        record.last_error = Some(RecordedError {
            kind: err.kind().to_string(),
            message: err.to_string(),
            at: now,
        });

        warn!(
            "❌ Sync failed ({} in a row), keeping {} listings: {}",
            record.consecutive_failures,
            current.snapshot.len(),
            err
        );

        self.state.store(Arc::new(CacheState {
            snapshot: Arc::clone(&current.snapshot),
            record,
        }));
        SyncReport {
            status: self.status_at(now),
            error: Some(err),
        }
    }

    fn status_at(&self, now: DateTime<Utc>) -> CacheStatus {
        let state = self.state.load();
        let record = &state.record;
        let last_sync_time = state.snapshot.built_at();
        let needs_refresh = match last_sync_time {
            None => true,
            Some(synced) => (now - synced)
                .to_std()
                .map(|age| age > self.settings.freshness_window)
                .unwrap_or(false),
        };

        CacheStatus {
            listings_count: state.snapshot.len(),
            last_sync_time,
            auto_sync_active: self.scheduler.is_active(),
            needs_refresh,
            last_attempt_time: record.last_attempt_time,
            last_error: record.last_error.clone(),
            failed_locales: record.failed_locales.clone(),
            consecutive_failures: record.consecutive_failures,
            mapping_anomalies: record.mapping_anomalies,
            slug_collisions: record.slug_collisions,
        }
    }
}
