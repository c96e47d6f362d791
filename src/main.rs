use std::sync::Arc;

use anyhow::Context;
use listings_sync::{ApiClient, ListingsCache, Locale, MultilingualListing, Settings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SNAPSHOT_FILE: &str = "listings_snapshot.json";
const LISTINGS_DIR: &str = "listings";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let watch = std::env::args().skip(1).any(|arg| arg == "--watch");

    info!("🏠 Listings Sync");
    info!("==========================================");
    info!("");

    let settings = Settings::from_env().context("Failed to load settings")?;
    let client = ApiClient::new(settings.api.clone()).context("Failed to create API client")?;
    let cache = ListingsCache::new(Arc::new(client), settings.cache.clone());

    let status = cache.init().await.context("Initial listings sync failed")?;
    if let Some(err) = &status.last_error {
        warn!("⚠️  Initial sync did not complete: {}", err.message);
    }
    for failure in &status.failed_locales {
        warn!("⚠️  Locale {} skipped: {}", failure.locale, failure.message);
    }

    let listings = cache.get_listings(settings.cache.default_locale);
    info!("\n✅ Synced {} listings\n", listings.len());

    for (i, listing) in listings.iter().enumerate() {
        println!(
            "{}. {} ({})",
            i + 1,
            listing.address.as_deref().unwrap_or("(no address)"),
            price_label(listing.debt_free_price.or(listing.sales_price), listing.rent)
        );
        if let Some(city) = &listing.city {
            println!("   City: {}", city);
        }
        if let Some(area) = listing.living_area {
            println!("   {} m², {}", area, listing.rooms.as_deref().unwrap_or("? rooms"));
        }
        println!("   ID: {}", listing.id);
        println!("   Slug: {}", listing.slug);
        println!();
    }

    // Save the multilingual snapshot
    let multilingual = cache.get_multilingual_listings();
    let records: Vec<&MultilingualListing> = multilingual.iter().map(|l| l.as_ref()).collect();
    let json = serde_json::to_string_pretty(&records)?;
    tokio::fs::write(SNAPSHOT_FILE, json)
        .await
        .with_context(|| format!("Failed to write {SNAPSHOT_FILE}"))?;
    info!("💾 Saved all listings to {}", SNAPSHOT_FILE);

    // Save each listing, one file per locale
    tokio::fs::create_dir_all(LISTINGS_DIR).await?;
    for listing in &multilingual {
        for locale in &settings.cache.locales {
            let Some(view) = cache.get_converted_listing_by_slug(&listing.slug, *locale) else {
                continue;
            };
            let filename = format!("{}/{}.{}.json", LISTINGS_DIR, listing.slug, locale);
            tokio::fs::write(&filename, serde_json::to_string_pretty(&view)?).await?;
        }
    }
    info!("💾 Saved {} listings to {}/", multilingual.len(), LISTINGS_DIR);

    if watch {
        cache.start_auto_sync()?;
        info!("👀 Watching for changes, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;

        let stats = cache.stats(Locale::DEFAULT, 5);
        println!("{}", serde_json::to_string_pretty(&stats)?);
        cache.dispose();
    }

    Ok(())
}

fn price_label(price: Option<f64>, rent: Option<f64>) -> String {
    match (rent, price) {
        (Some(rent), _) => format!("{rent} €/kk"),
        (None, Some(price)) => format!("{price} €"),
        (None, None) => "price not set".to_string(),
    }
}
