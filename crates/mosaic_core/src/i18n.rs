//! Translation capability.
//!
//! The engine never owns locale data; it only asks a [`Translator`] for text.

use indexmap::IndexMap;

/// Source of human readable text
pub trait Translator: Send + Sync {
    /// Text for `key` in `locale`, if known
    fn text(&self, locale: &str, key: &str) -> Option<String>;

    /// Text for `key`, falling back to the key itself
    fn text_or_key(&self, locale: &str, key: &str) -> String {
        self.text(locale, key).unwrap_or_else(|| key.to_string())
    }
}

/// Translator that knows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTranslator;

impl Translator for NoopTranslator {
    fn text(&self, _locale: &str, _key: &str) -> Option<String> {
        None
    }
}

/// In-memory translator keyed by locale, then message key
#[derive(Debug, Clone, Default)]
pub struct MapTranslator {
    entries: IndexMap<String, IndexMap<String, String>>,
}

impl MapTranslator {
    /// Create an empty translator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry
    pub fn insert(&mut self, locale: &str, key: &str, text: &str) {
        self.entries
            .entry(locale.to_string())
            .or_default()
            .insert(key.to_string(), text.to_string());
    }

    /// Builder form of [`MapTranslator::insert`]
    #[must_use]
    pub fn with(mut self, locale: &str, key: &str, text: &str) -> Self {
        self.insert(locale, key, text);
        self
    }
}

impl Translator for MapTranslator {
    fn text(&self, locale: &str, key: &str) -> Option<String> {
        self.entries
            .get(locale)
            .and_then(|m| m.get(key))
            .cloned()
    }
}
