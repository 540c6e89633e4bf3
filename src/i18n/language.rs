//! Language set: the languages a single document is presented in.
//!
//! A `LanguageSet` is the union of the default languages and whatever
//! language codes a document already has translations for. Iteration order
//! is deterministic so that repeated renders of the same document produce
//! the same sequence of inputs: default languages first (registry order),
//! then every other code alphabetically.

use crate::i18n::LanguageRegistry;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSet {
    /// Codes outside the default set, kept sorted.
    extra: BTreeSet<String>,
}

impl LanguageSet {
    /// A set containing only the default languages.
    pub fn with_defaults() -> Self {
        Self {
            extra: BTreeSet::new(),
        }
    }

    /// Add a language code. Default codes and duplicates are no-ops.
    pub fn insert(&mut self, code: &str) {
        if !LanguageRegistry::get().is_default(code) {
            self.extra.insert(code.to_string());
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        LanguageRegistry::get().is_default(code) || self.extra.contains(code)
    }

    pub fn len(&self) -> usize {
        LanguageRegistry::get().defaults().len() + self.extra.len()
    }

    /// Never true: the defaults are always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over language codes in presentation order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        LanguageRegistry::get()
            .defaults()
            .iter()
            .map(|lang| lang.code)
            .chain(self.extra.iter().map(String::as_str))
    }
}

impl Default for LanguageSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<'a> FromIterator<&'a str> for LanguageSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::with_defaults();
        for code in iter {
            set.insert(code);
        }
        set
    }
}

impl Serialize for LanguageSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
