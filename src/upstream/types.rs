use crate::models::Locale;

/// Query parameters for the listings endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingsQuery {
    /// Each locale becomes one repeated `languages[]` parameter
    pub locales: Vec<Locale>,
}

impl ListingsQuery {
    pub fn new(locales: &[Locale]) -> Self {
        Self {
            locales: locales.to_vec(),
        }
    }

    /// Pairs ready for `RequestBuilder::query`
    pub fn to_pairs(&self) -> Vec<(&'static str, &'static str)> {
        self.locales
            .iter()
            .map(|locale| ("languages[]", locale.code()))
            .collect()
    }
}

impl Default for ListingsQuery {
    fn default() -> Self {
        Self::new(&[Locale::DEFAULT])
    }
}
