//! Request and response bodies of the admin API.

use crate::document::{
    build_edit_surface, derive_language_set, EditedValues, FieldEdit, UpdateInstruction, ID_FIELD,
};
use crate::i18n::LanguageSet;
use crate::replication::ReplicationReport;
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

// ==================== Notices ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A user-visible message attached to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

// ==================== Document Ids ====================

/// Document ids travel as relaxed extended JSON (`{"$oid": "..."}` for
/// ObjectIds, plain JSON for strings and numbers).
pub fn id_to_json(id: &Bson) -> serde_json::Value {
    id.clone().into_relaxed_extjson()
}

pub fn id_from_json(value: serde_json::Value) -> Result<Bson, String> {
    if value.is_null() {
        return Err("document id is required".to_string());
    }
    Bson::try_from(value).map_err(|e| format!("invalid document id: {}", e))
}

// ==================== Responses ====================

/// A document as presented for editing.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub id: serde_json::Value,
    pub languages: LanguageSet,
    pub fields: Vec<FieldEdit>,
}

impl DocumentView {
    pub fn from_document(document: &Document) -> Self {
        let languages = derive_language_set(document);
        let fields = build_edit_surface(document, &languages);
        Self {
            id: document
                .get(ID_FIELD)
                .map(id_to_json)
                .unwrap_or(serde_json::Value::Null),
            languages,
            fields,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NoticesResponse {
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
pub struct CollectionsResponse {
    pub collections: Vec<String>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
pub struct DocumentsResponse {
    pub collection: String,
    pub page: u64,
    pub page_size: u64,
    pub search: String,
    pub documents: Vec<DocumentView>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub applied: UpdateInstruction,
    pub matched: bool,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
pub struct PromoteResponse {
    pub report: ReplicationReport,
    pub notices: Vec<Notice>,
}

// ==================== Requests ====================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub id: serde_json::Value,
    #[serde(default)]
    pub values: EditedValues,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromoteQuery {
    pub mode: Option<String>,
    pub resume_from: Option<u64>,
}
