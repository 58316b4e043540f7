use std::cmp::Ordering;
use std::fmt;

use icu_collator::{Collator, CollatorOptions};
use icu_locid::Locale;

/// Locale-aware string ordering for group and member labels. Falls back to
/// code point order when the locale cannot be loaded.
pub struct LabelCollator {
    locale: String,
    collator: Option<Collator>,
}

impl LabelCollator {
    pub fn new(locale: &str) -> Self {
        let collator = match build_collator(locale) {
            Ok(collator) => Some(collator),
            Err(message) => {
                tracing::warn!(
                    locale,
                    error = %message,
                    "collation locale unavailable, using code point order"
                );
                None
            }
        };
        Self {
            locale: locale.to_owned(),
            collator,
        }
    }

    pub fn code_point() -> Self {
        Self {
            locale: String::new(),
            collator: None,
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn is_locale_aware(&self) -> bool {
        self.collator.is_some()
    }

    /// Total order: labels the collator treats as equal fall back to code
    /// point order so sorting stays deterministic.
    pub fn compare(&self, left: &str, right: &str) -> Ordering {
        match &self.collator {
            Some(collator) => collator
                .compare(left, right)
                .then_with(|| left.cmp(right)),
            None => left.cmp(right),
        }
    }
}

impl fmt::Debug for LabelCollator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelCollator")
            .field("locale", &self.locale)
            .field("locale_aware", &self.collator.is_some())
            .finish()
    }
}

fn build_collator(locale: &str) -> Result<Collator, String> {
    let locale: Locale = locale.parse().map_err(|err| format!("{err}"))?;
    Collator::try_new(&(&locale).into(), CollatorOptions::new()).map_err(|err| format!("{err}"))
}
