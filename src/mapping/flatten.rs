use serde_json::Value;

use crate::mapping::sentinel::{is_empty_sentinel, parse_amount, parse_number};
use crate::models::{AgentView, Field, FlattenedListing, Locale, MultilingualListing};

/// Project a listing onto one locale.
///
/// Each field walks `locale → fi → sv → en` and takes the first value that
/// is usable for its type. Blank text, placeholders and zero amounts are
/// skipped, so a later locale can fill in. Text comes back trimmed, so a
/// view equals the raw locale value up to surrounding whitespace.
pub fn flatten(listing: &MultilingualListing, locale: Locale) -> FlattenedListing {
    let text = |field: Field| resolve(listing, field, locale, as_text);
    let number = |field: Field| resolve(listing, field, locale, parse_amount);
    let coordinate = |field: Field| resolve(listing, field, locale, parse_number);

    FlattenedListing {
        id: listing.id.clone(),
        slug: listing.slug.clone(),
        locale,
        address: text(Field::Address),
        postal_code: text(Field::PostalCode),
        city: text(Field::City),
        district: text(Field::District),
        description: text(Field::Description),
        status: text(Field::Status),
        listing_type: text(Field::ListingType),
        debt_free_price: number(Field::DebtFreePrice),
        sales_price: number(Field::SalesPrice),
        rent: number(Field::Rent),
        living_area: number(Field::LivingArea),
        rooms: text(Field::Rooms),
        year_built: resolve(listing, Field::YearBuilt, locale, as_year),
        floor: text(Field::Floor),
        latitude: coordinate(Field::Latitude),
        longitude: coordinate(Field::Longitude),
        images: resolve(listing, Field::Images, locale, as_images).unwrap_or_default(),
        virtual_tour: text(Field::VirtualTour),
        agent: AgentView {
            name: text(Field::AgentName),
            email: text(Field::AgentEmail),
            phone: text(Field::AgentPhone),
        },
        published_at: text(Field::PublishedAt),
    }
}

/// Whether the listing carries a real rent amount in any locale
pub fn has_rent(listing: &MultilingualListing) -> bool {
    resolve(listing, Field::Rent, Locale::DEFAULT, parse_amount).is_some()
}

fn resolve<T>(
    listing: &MultilingualListing,
    field: Field,
    locale: Locale,
    pick: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    listing.field(field)?.resolve_with(locale, pick)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_empty_sentinel(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_year(value: &Value) -> Option<i32> {
    parse_amount(value)
        .filter(|y| y.fract() == 0.0 && (1000.0..=9999.0).contains(y))
        .map(|y| y as i32)
}

fn as_images(value: &Value) -> Option<Vec<String>> {
    let urls: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(image_url).collect(),
        other => image_url(other).into_iter().collect(),
    };
    (!urls.is_empty()).then_some(urls)
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_empty_sentinel(s) => Some(s.trim().to_string()),
        Value::Object(map) => ["url", "src", "original"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|s| !is_empty_sentinel(s))
            .map(|s| s.trim().to_string()),
        _ => None,
    }
}
