//! URL-safe, collision-free identifiers derived from listing addresses.

use std::collections::HashSet;

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Used when an address normalizes to nothing
const FALLBACK_BASE: &str = "listing";

const RANDOM_SUFFIX_LEN: usize = 6;

/// What the resolver knows besides the address
#[derive(Debug, Clone, Copy)]
pub struct SlugContext<'a> {
    pub postal_code: Option<&'a str>,
    pub city: Option<&'a str>,
    /// Slugs already handed out in the snapshot being built
    pub existing: &'a HashSet<String>,
}

/// Disambiguation step taken after a collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SlugStep {
    PostalCode,
    City,
    RandomSuffix,
}

/// One collision: `taken` was in use, so `candidate` was tried next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlugCollision {
    pub taken: String,
    pub step: SlugStep,
    pub candidate: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugResolution {
    pub slug: String,
    pub collisions: Vec<SlugCollision>,
}

/// Lowercase, strip diacritics, collapse everything that is not `[a-z0-9]`
/// into single hyphens.
pub fn normalize(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.to_lowercase().nfd().filter(|c| !is_combining_mark(*c)) {
        let folded = match c {
            'ø' => "o",
            'æ' => "ae",
            'œ' => "oe",
            'ß' => "ss",
            'đ' => "d",
            'ł' => "l",
            _ => "",
        };

        if c.is_ascii_alphanumeric() || !folded.is_empty() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            if folded.is_empty() {
                slug.push(c);
            } else {
                slug.push_str(folded);
            }
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Resolve a unique slug for `address`.
///
/// Tries the bare address, then `-postal`, then `-postal-city` (or `-city`
/// without a postal code), and finally a random suffix. Deterministic for
/// identical inputs until the random step.
pub fn resolve(address: &str, ctx: &SlugContext<'_>) -> SlugResolution {
    let base = Some(normalize(address))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_BASE.to_string());
    let postal = ctx.postal_code.map(normalize).filter(|s| !s.is_empty());
    let city = ctx.city.map(normalize).filter(|s| !s.is_empty());

    let mut steps = Vec::with_capacity(2);
    if let Some(postal) = &postal {
        steps.push((SlugStep::PostalCode, format!("{base}-{postal}")));
    }
    if let Some(city) = &city {
        let candidate = match &postal {
            Some(postal) => format!("{base}-{postal}-{city}"),
            None => format!("{base}-{city}"),
        };
        steps.push((SlugStep::City, candidate));
    }

    let mut collisions = Vec::new();
    let mut current = base;
    if !ctx.existing.contains(&current) {
        return SlugResolution {
            slug: current,
            collisions,
        };
    }

    for (step, candidate) in steps {
        debug!(taken = %current, candidate = %candidate, ?step, "Slug collision");
        collisions.push(SlugCollision {
            taken: current,
            step,
            candidate: candidate.clone(),
        });
        current = candidate;
        if !ctx.existing.contains(&current) {
            return SlugResolution {
                slug: current,
                collisions,
            };
        }
    }

    let stem = current.clone();
    loop {
        let candidate = format!("{stem}-{}", random_suffix());
        debug!(taken = %current, candidate = %candidate, step = ?SlugStep::RandomSuffix, "Slug collision");
        collisions.push(SlugCollision {
            taken: current,
            step: SlugStep::RandomSuffix,
            candidate: candidate.clone(),
        });
        if !ctx.existing.contains(&candidate) {
            return SlugResolution {
                slug: candidate,
                collisions,
            };
        }
        current = candidate;
    }
}

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(slugs: &[&str]) -> HashSet<String> {
        slugs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_folds_diacritics_and_punctuation() {
        assert_eq!(normalize("Mannerheimintie 1"), "mannerheimintie-1");
        assert_eq!(normalize("Åkerlundinkatu 5 B 12"), "akerlundinkatu-5-b-12");
        assert_eq!(normalize("Töölöntorinkatu 2–4"), "toolontorinkatu-2-4");
        assert_eq!(normalize("  --Foo__Bar!! "), "foo-bar");
        assert_eq!(normalize("Große Straße"), "grosse-strasse");
        assert_eq!(normalize("Søndre gate"), "sondre-gate");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn free_base_is_used_as_is() {
        let existing = taken(&["other-street-1"]);
        let ctx = SlugContext {
            postal_code: Some("00100"),
            city: Some("Helsinki"),
            existing: &existing,
        };
        let resolution = resolve("Mannerheimintie 1", &ctx);
        assert_eq!(resolution.slug, "mannerheimintie-1");
        assert!(resolution.collisions.is_empty());
    }

    fn helsinki(existing: &HashSet<String>) -> SlugContext<'_> {
        SlugContext {
            postal_code: Some("00100"),
            city: Some("Helsinki"),
            existing,
        }
    }

    #[test]
    fn collision_appends_postal_then_city() {
        let existing = taken(&["mannerheimintie-1"]);
        let resolution = resolve("Mannerheimintie 1", &helsinki(&existing));
        assert_eq!(resolution.slug, "mannerheimintie-1-00100");
        assert_eq!(resolution.collisions.len(), 1);
        assert_eq!(resolution.collisions[0].step, SlugStep::PostalCode);
        assert_eq!(resolution.collisions[0].taken, "mannerheimintie-1");

        let existing = taken(&["mannerheimintie-1", "mannerheimintie-1-00100"]);
        let resolution = resolve("Mannerheimintie 1", &helsinki(&existing));
        assert_eq!(resolution.slug, "mannerheimintie-1-00100-helsinki");
        assert_eq!(
            resolution.collisions.iter().map(|c| c.step).collect::<Vec<_>>(),
            vec![SlugStep::PostalCode, SlugStep::City]
        );
    }

    #[test]
    fn city_only_when_postal_code_missing() {
        let existing = taken(&["kauppakatu-3"]);
        let ctx = SlugContext {
            postal_code: None,
            city: Some("Jyväskylä"),
            existing: &existing,
        };
        assert_eq!(resolve("Kauppakatu 3", &ctx).slug, "kauppakatu-3-jyvaskyla");
    }

    #[test]
    fn random_suffix_as_last_resort() {
        let existing = taken(&["mannerheimintie-1"]);
        let ctx = SlugContext {
            postal_code: None,
            city: None,
            existing: &existing,
        };

        let resolution = resolve("Mannerheimintie 1", &ctx);
        let suffix = resolution
            .slug
            .strip_prefix("mannerheimintie-1-")
            .expect("suffixed slug");
        assert_eq!(suffix.len(), RANDOM_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(!existing.contains(&resolution.slug));
        assert_eq!(resolution.collisions[0].step, SlugStep::RandomSuffix);
    }

    #[test]
    fn deterministic_without_random_step() {
        let existing = taken(&["rantatie-7"]);
        let ctx = SlugContext {
            postal_code: Some("02100"),
            city: Some("Espoo"),
            existing: &existing,
        };
        assert_eq!(resolve("Rantatie 7", &ctx), resolve("Rantatie 7", &ctx));
    }

    #[test]
    fn empty_address_gets_fallback_base() {
        let existing = HashSet::new();
        let ctx = SlugContext {
            postal_code: None,
            city: None,
            existing: &existing,
        };
        assert_eq!(resolve("  ", &ctx).slug, "listing");
    }
}
