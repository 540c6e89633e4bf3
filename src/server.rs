//! HTTP surface of the admin service.
//!
//! Storage failures never turn into 5xx responses here: they are logged,
//! reported as an error notice, and the response degrades to an empty
//! result.

use crate::config::Config;
use crate::document::{build_search_filter, build_update_instruction, DocumentShape, SearchFilter};
use crate::replication::{promote_collection, FailureMode, ReplicationOptions};
use crate::retry::RetryConfig;
use crate::security::Credentials;
use crate::session::{
    expired_session_cookie, session_cookie, token_from_headers, Session, SessionStore,
};
use crate::store::DocumentStore;
use crate::views::{
    id_from_json, CollectionsResponse, DocumentQuery, DocumentView, DocumentsResponse,
    LoginRequest, Notice, NoticesResponse, PromoteQuery, PromoteResponse, UpdateRequest,
    UpdateResponse,
};
use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credentials: Credentials,
    /// Store the dashboard reads and edits.
    pub dev: Arc<dyn DocumentStore>,
    /// Store that promote copies into.
    pub release: Arc<dyn DocumentStore>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        config: Config,
        dev: Arc<dyn DocumentStore>,
        release: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            credentials: config.credentials(),
            sessions: SessionStore::new(config.session_ttl()),
            config: Arc::new(config),
            dev,
            release,
        }
    }
}

// ==================== Errors ====================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please log in first")]
    Unauthorized,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = NoticesResponse {
            notices: vec![Notice::error(self.to_string())],
        };
        (status, Json(body)).into_response()
    }
}

// ==================== Authentication ====================

/// A request carrying a valid session cookie.
pub struct AuthSession {
    pub token: String,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let session = state
            .sessions
            .get(&token)
            .await
            .ok_or(ApiError::Unauthorized)?;
        Ok(Self { token, session })
    }
}

// ==================== Handlers ====================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if !state.credentials.verify(&request.username, &request.password) {
        warn!("Rejected login attempt");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.sessions.create(&request.username).await;
    info!("User '{}' logged in", request.username);

    let body = NoticesResponse {
        notices: vec![Notice::success("Logged in")],
    };
    let cookie = session_cookie(&token, state.config.secure_cookies);
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = token_from_headers(&headers) {
        if state.sessions.remove(&token).await {
            info!("Session ended");
        }
    }

    let body = NoticesResponse {
        notices: vec![Notice::info("Logged out")],
    };
    let cookie = expired_session_cookie(state.config.secure_cookies);
    ([(header::SET_COOKIE, cookie)], Json(body)).into_response()
}

async fn list_collections(_auth: AuthSession, State(state): State<AppState>) -> Json<CollectionsResponse> {
    let mut notices = Vec::new();
    let collections = match state.dev.list_collections().await {
        Ok(collections) => collections,
        Err(e) => {
            error!("Error fetching collections: {}", e);
            notices.push(Notice::error(format!("Error fetching collections: {}", e)));
            Vec::new()
        }
    };

    if collections.is_empty() && notices.is_empty() {
        notices.push(Notice::warning("No collections found in the database."));
    }

    Json(CollectionsResponse {
        collections,
        notices,
    })
}

/// Fetch one document to learn the collection's field names when the
/// session has not seen this collection yet.
async fn seed_shape(
    state: &AppState,
    token: &str,
    collection: &str,
    notices: &mut Vec<Notice>,
) -> DocumentShape {
    match state.dev.find(collection, &SearchFilter::MatchAll, 0, 1).await {
        Ok(sample) => {
            let shape = sample
                .first()
                .map(DocumentShape::from_document)
                .unwrap_or_default();
            state
                .sessions
                .remember_shape(token, collection, shape.clone())
                .await;
            shape
        }
        Err(e) => {
            error!("Error sampling {}: {}", collection, e);
            notices.push(Notice::error(format!("Error fetching data: {}", e)));
            DocumentShape::default()
        }
    }
}

async fn list_documents(
    auth: AuthSession,
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<DocumentQuery>,
) -> Json<DocumentsResponse> {
    let page = query.page.unwrap_or(0);
    let page_size = state.config.page_size(query.page_size);
    let search = query.search.unwrap_or_default();
    let mut notices = Vec::new();

    let shape = match auth.session.shape_for(&collection) {
        Some(shape) => shape.clone(),
        None if !search.is_empty() => {
            seed_shape(&state, &auth.token, &collection, &mut notices).await
        }
        None => DocumentShape::default(),
    };
    let filter = build_search_filter(&search, shape.field_names());

    let documents = match state
        .dev
        .find(&collection, &filter, page.saturating_mul(page_size), page_size)
        .await
    {
        Ok(documents) => documents,
        Err(e) => {
            error!("Error fetching {}: {}", collection, e);
            notices.push(Notice::error(format!("Error fetching data: {}", e)));
            Vec::new()
        }
    };

    if let Some(last) = documents.last() {
        state
            .sessions
            .remember_shape(&auth.token, &collection, DocumentShape::from_document(last))
            .await;
    } else if notices.is_empty() {
        notices.push(Notice::warning("No data found in the selected collection."));
    }

    Json(DocumentsResponse {
        documents: documents.iter().map(DocumentView::from_document).collect(),
        collection,
        page,
        page_size,
        search,
        notices,
    })
}

async fn update_document(
    auth: AuthSession,
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let id = id_from_json(request.id).map_err(ApiError::BadRequest)?;
    let instruction = build_update_instruction(&request.values);

    if instruction.is_empty() {
        return Ok(Json(UpdateResponse {
            applied: instruction,
            matched: false,
            notices: vec![Notice::info("Nothing to update: all fields are empty")],
        }));
    }

    let (matched, notice) = match state.dev.update_one(&collection, &id, &instruction).await {
        Ok(true) => {
            info!("Updated {} fields of {} in {}", instruction.len(), id, collection);
            let shape = auth
                .session
                .shape_for(&collection)
                .cloned()
                .unwrap_or_default()
                .with_edited(&instruction);
            state
                .sessions
                .remember_shape(&auth.token, &collection, shape)
                .await;
            (true, Notice::success("Data updated successfully!"))
        }
        Ok(false) => {
            warn!("Update matched no document {} in {}", id, collection);
            (
                false,
                Notice::warning(format!("No document with id {} in {}", id, collection)),
            )
        }
        Err(e) => {
            error!("Error updating {} in {}: {}", id, collection, e);
            (false, Notice::error(format!("Error updating data: {}", e)))
        }
    };

    Ok(Json(UpdateResponse {
        applied: instruction,
        matched,
        notices: vec![notice],
    }))
}

async fn promote(
    _auth: AuthSession,
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<PromoteQuery>,
) -> Result<Json<PromoteResponse>, ApiError> {
    let failure_mode = match query.mode.as_deref() {
        Some(mode) => mode.parse::<FailureMode>().map_err(ApiError::BadRequest)?,
        None => FailureMode::AbortOnFirstError,
    };
    let options = ReplicationOptions {
        batch_size: state.config.replication_batch_size,
        failure_mode,
        start_offset: query.resume_from.unwrap_or(0),
        retry: RetryConfig::store_write(),
    };

    let report = promote_collection(
        state.dev.as_ref(),
        state.release.as_ref(),
        &collection,
        &options,
    )
    .await;

    let notice = if report.is_complete() {
        Notice::success("Release database updated successfully!")
    } else {
        Notice::error(format!(
            "Error updating release database: {} of {} documents failed{}",
            report.failed.len(),
            report.succeeded + report.failed.len() as u64,
            if report.aborted {
                format!(", stopped at offset {}", report.next_offset)
            } else {
                String::new()
            }
        ))
    };

    Ok(Json(PromoteResponse {
        report,
        notices: vec![notice],
    }))
}

// ==================== Router ====================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/collections", get(list_collections))
        .route("/collections/:collection/documents", get(list_documents))
        .route("/collections/:collection/documents/update", post(update_document))
        .route("/collections/:collection/promote", post(promote))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Bind to `0.0.0.0:port` and serve until Ctrl-C.
pub async fn serve(state: AppState) -> Result<()> {
    let port = state.config.port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;

    info!("✓ Listening on port {}", port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
