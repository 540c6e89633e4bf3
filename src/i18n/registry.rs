//! Language registry: the default languages every document is edited in.
//!
//! Documents may carry translations for any language code, but the edit
//! surface always offers the default languages, in registry order, even
//! when a document has no translation for them yet.

use std::sync::OnceLock;

/// A default language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Language code as stored under `translations` (e.g., "en", "zh-CN")
    pub code: &'static str,
}

/// Global language registry singleton.
pub struct LanguageRegistry {
    defaults: Vec<LanguageConfig>,
}

/// Global registry instance (initialized lazily)
static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global language registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            defaults: default_languages(),
        })
    }

    /// All default languages, in presentation order.
    pub fn defaults(&self) -> &[LanguageConfig] {
        &self.defaults
    }

    /// Position of `code` among the default languages, if it is one.
    pub fn default_position(&self, code: &str) -> Option<usize> {
        self.defaults.iter().position(|lang| lang.code == code)
    }

    /// Check if a language code belongs to the default set.
    pub fn is_default(&self, code: &str) -> bool {
        self.default_position(code).is_some()
    }
}

fn default_languages() -> Vec<LanguageConfig> {
    ["en", "zh-CN", "zh-TW"]
        .into_iter()
        .map(|code| LanguageConfig { code })
        .collect()
}
