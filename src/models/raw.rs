use serde_json::{Map, Value};

use super::Locale;

/// One upstream record as returned for a single locale request
pub type RawListing = Map<String, Value>;

/// The shapes a provider field has been observed in
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawField<'a> {
    /// `{ "fi": { "value": .. } }` or `{ "fi": .. }`
    LocaleNested(&'a Value),
    /// `{ "value": .. }`
    WrappedValue(&'a Value),
    /// string, number, bool or array
    Scalar(&'a Value),
    Absent,
    /// An object matching none of the above
    Unrecognized(&'a Value),
}

impl<'a> RawField<'a> {
    /// Classify a raw field for the locale its record was requested in.
    ///
    /// Checked in order: nested-locale shape, `{value}` shape, scalar.
    pub fn classify(raw: Option<&'a Value>, locale: Locale) -> Self {
        let Some(value) = raw else {
            return RawField::Absent;
        };

        match value {
            Value::Null => RawField::Absent,
            Value::Object(map) => {
                let has_locale_keys = Locale::ALL.iter().any(|l| map.contains_key(l.code()));
                if has_locale_keys {
                    return match map.get(locale.code()) {
                        Some(inner) if !inner.is_null() => RawField::LocaleNested(inner),
                        _ => RawField::Absent,
                    };
                }
                match map.get("value") {
                    Some(Value::Null) => RawField::Absent,
                    Some(inner) => RawField::WrappedValue(inner),
                    None => RawField::Unrecognized(value),
                }
            }
            _ => RawField::Scalar(value),
        }
    }

    /// The normalized value, if any. Unrecognized shapes yield `None`.
    pub fn value(self) -> Option<&'a Value> {
        match self {
            RawField::LocaleNested(inner) => match inner {
                Value::Object(map) if map.contains_key("value") => {
                    map.get("value").filter(|v| !v.is_null())
                }
                Value::Object(_) => None,
                other => Some(other),
            },
            RawField::WrappedValue(inner) | RawField::Scalar(inner) => Some(inner),
            RawField::Absent | RawField::Unrecognized(_) => None,
        }
    }

    /// Whether the shape was something we could not make sense of
    pub fn is_anomalous(self) -> bool {
        match self {
            RawField::Unrecognized(_) => true,
            RawField::LocaleNested(Value::Object(map)) => !map.contains_key("value"),
            _ => false,
        }
    }
}
