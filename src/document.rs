//! Document field reconciliation.
//!
//! Turns a fetched document into the set of editable inputs an operator
//! sees (one per text field, plus one per language under
//! `translations.<lang>.<field>`), and turns the operator's edited values
//! back into a minimal `$set` instruction.

use crate::i18n::LanguageSet;
use mongodb::bson::{Bson, Document};
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Reserved identifier field.
pub const ID_FIELD: &str = "_id";

/// Reserved field holding `lang -> field -> translated string`.
pub const TRANSLATIONS_FIELD: &str = "translations";

/// Fields whose lowercase name contains any of these are never editable.
const EXCLUDED_NAME_PARTS: [&str; 3] = ["id", "image", "photo"];

/// Edited values as submitted by a form: dotted path -> string.
pub type EditedValues = BTreeMap<String, String>;

// ==================== Field Classification ====================

/// The closed set of top-level field shapes the editor understands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind<'a> {
    /// A scalar string value.
    Text(&'a str),
    /// The reserved `translations` mapping.
    Translations(&'a Document),
    /// Anything else: numbers, arrays, nested documents, ids.
    Passthrough(&'a Bson),
}

impl<'a> FieldKind<'a> {
    pub fn classify(name: &str, value: &'a Bson) -> Self {
        match value {
            Bson::Document(inner) if name == TRANSLATIONS_FIELD => FieldKind::Translations(inner),
            Bson::String(text) => FieldKind::Text(text),
            other => FieldKind::Passthrough(other),
        }
    }
}

/// Callbacks for walking a document's top-level fields in document order.
pub trait FieldVisitor<'a> {
    fn visit_text(&mut self, _name: &'a str, _value: &'a str) {}
    fn visit_translations(&mut self, _translations: &'a Document) {}
    fn visit_passthrough(&mut self, _name: &'a str, _value: &'a Bson) {}
}

pub fn walk_fields<'a, V: FieldVisitor<'a>>(document: &'a Document, visitor: &mut V) {
    for (name, value) in document {
        match FieldKind::classify(name, value) {
            FieldKind::Text(text) => visitor.visit_text(name, text),
            FieldKind::Translations(translations) => visitor.visit_translations(translations),
            FieldKind::Passthrough(other) => visitor.visit_passthrough(name, other),
        }
    }
}

/// Whether a field name is eligible for editing at all.
///
/// The check is a substring match, so names like `video` or `hidden` are
/// excluded too.
pub fn is_editable_field_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    !EXCLUDED_NAME_PARTS.iter().any(|part| lower.contains(part))
}

// ==================== Language Set ====================

struct LanguageCollector {
    languages: LanguageSet,
}

impl<'a> FieldVisitor<'a> for LanguageCollector {
    fn visit_translations(&mut self, translations: &'a Document) {
        for code in translations.keys() {
            self.languages.insert(code);
        }
    }
}

/// Languages to present for a document: its translation keys plus the
/// defaults. A missing or non-document `translations` field counts as empty.
pub fn derive_language_set(document: &Document) -> LanguageSet {
    let mut collector = LanguageCollector {
        languages: LanguageSet::with_defaults(),
    };
    walk_fields(document, &mut collector);
    collector.languages
}

// ==================== Edit Surface ====================

/// One editable input: a dotted path and its current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldEdit {
    pub path: String,
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub label: String,
    pub value: String,
}

impl FieldEdit {
    fn base(field: &str, value: &str) -> Self {
        Self {
            path: field.to_string(),
            field: field.to_string(),
            language: None,
            label: format!("Edit {}", field),
            value: value.to_string(),
        }
    }

    fn translation(field: &str, language: &str, value: &str) -> Self {
        Self {
            path: translation_path(language, field),
            field: field.to_string(),
            language: Some(language.to_string()),
            label: format!("Edit {} [{}]", field, language),
            value: value.to_string(),
        }
    }
}

/// `translations.<lang>.<field>`
pub fn translation_path(language: &str, field: &str) -> String {
    format!("{}.{}.{}", TRANSLATIONS_FIELD, language, field)
}

fn existing_translation<'a>(document: &'a Document, language: &str, field: &str) -> &'a str {
    document
        .get_document(TRANSLATIONS_FIELD)
        .ok()
        .and_then(|translations| translations.get_document(language).ok())
        .and_then(|entries| entries.get_str(field).ok())
        .unwrap_or("")
}

struct EditSurfaceBuilder<'a, 'l> {
    document: &'a Document,
    languages: &'l LanguageSet,
    edits: Vec<FieldEdit>,
}

impl<'a, 'l> FieldVisitor<'a> for EditSurfaceBuilder<'a, 'l> {
    fn visit_text(&mut self, name: &'a str, value: &'a str) {
        if !is_editable_field_name(name) {
            return;
        }

        let languages = self.languages;
        self.edits.push(FieldEdit::base(name, value));
        for language in languages.iter() {
            let current = existing_translation(self.document, language, name);
            self.edits.push(FieldEdit::translation(name, language, current));
        }
    }
}

/// Build the ordered inputs for a document: for each editable text field,
/// the base value followed by one entry per language.
pub fn build_edit_surface(document: &Document, languages: &LanguageSet) -> Vec<FieldEdit> {
    let mut builder = EditSurfaceBuilder {
        document,
        languages,
        edits: Vec::new(),
    };
    walk_fields(document, &mut builder);
    builder.edits
}

// ==================== Update Instruction ====================

/// Paths to overwrite with new string values, applied as a `$set`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UpdateInstruction {
    fields: BTreeMap<String, String>,
}

impl UpdateInstruction {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.fields.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// The fields of the `$set` operator, keyed by dotted path.
    pub fn to_set_fields(&self) -> Document {
        self.fields
            .iter()
            .map(|(path, value)| (path.clone(), Bson::String(value.clone())))
            .collect()
    }
}

/// Keep only the edits that carry a value. An empty string means "leave the
/// field alone", not "clear it".
pub fn build_update_instruction(edited: &EditedValues) -> UpdateInstruction {
    UpdateInstruction {
        fields: edited
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect(),
    }
}

// ==================== Search ====================

/// Field names of a sample document, used to decide which fields a search
/// term is matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentShape {
    fields: Vec<String>,
}

impl DocumentShape {
    pub fn from_document(document: &Document) -> Self {
        Self {
            fields: document.keys().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// The shape of a document after `instruction` was applied to it: the
    /// top-level field of every written path is added.
    pub fn with_edited(&self, instruction: &UpdateInstruction) -> Self {
        let edited = instruction
            .iter()
            .filter_map(|(path, _)| path.split('.').next());
        self.field_names().chain(edited).collect()
    }
}

impl<'a> FromIterator<&'a str> for DocumentShape {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut fields: Vec<String> = Vec::new();
        for name in iter {
            if !fields.iter().any(|existing| existing == name) {
                fields.push(name.to_string());
            }
        }
        Self { fields }
    }
}

/// A query predicate handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    MatchAll,
    /// Case-insensitive literal substring match on at least one field.
    AnyFieldContains { term: String, fields: Vec<String> },
}

impl SearchFilter {
    /// Render as a MongoDB query document.
    pub fn to_query(&self) -> Document {
        match self {
            SearchFilter::MatchAll => Document::new(),
            SearchFilter::AnyFieldContains { term, fields } => {
                let pattern = regex::escape(term);
                let clauses: Vec<Bson> = fields
                    .iter()
                    .map(|field| {
                        let mut condition = Document::new();
                        condition.insert("$regex", pattern.clone());
                        condition.insert("$options", "i");
                        let mut clause = Document::new();
                        clause.insert(field.clone(), condition);
                        Bson::Document(clause)
                    })
                    .collect();
                let mut query = Document::new();
                query.insert("$or", clauses);
                query
            }
        }
    }

    /// Evaluate against a document in memory, with the same semantics as
    /// `to_query` on the server: only string fields can match.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            SearchFilter::MatchAll => true,
            SearchFilter::AnyFieldContains { term, fields } => {
                let Ok(regex) = RegexBuilder::new(&regex::escape(term))
                    .case_insensitive(true)
                    .build()
                else {
                    return false;
                };
                fields.iter().any(|field| {
                    matches!(document.get(field), Some(Bson::String(value)) if regex.is_match(value))
                })
            }
        }
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchFilter::MatchAll => write!(f, "match-all"),
            SearchFilter::AnyFieldContains { term, fields } => {
                write!(f, "'{}' in [{}]", term, fields.join(", "))
            }
        }
    }
}

/// Match `term` against any of `fields`. An empty term or an empty field set
/// matches every document.
pub fn build_search_filter<'a, I>(term: &str, fields: I) -> SearchFilter
where
    I: IntoIterator<Item = &'a str>,
{
    let fields: Vec<String> = fields.into_iter().map(str::to_string).collect();
    if term.is_empty() || fields.is_empty() {
        return SearchFilter::MatchAll;
    }

    SearchFilter::AnyFieldContains {
        term: term.to_string(),
        fields,
    }
}
