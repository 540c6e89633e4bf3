//! Internationalization (i18n) support for translated document fields.
//!
//! Documents keep per-language overrides of their text fields under
//! `translations.<lang>.<field>`. This module decides which languages an
//! edit form offers for a given document.
//!
//! - `registry`: the default languages offered for every document
//! - `language`: `LanguageSet`, a deterministic union of defaults and the
//!   languages a document already has

mod language;
mod registry;

pub use language::LanguageSet;
pub use registry::{LanguageConfig, LanguageRegistry};
