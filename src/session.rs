//! Operator sessions.
//!
//! A session exists only after a successful login, so holding a token that
//! resolves to a `Session` is what "logged in" means. Each session also keeps
//! the shape of the last document seen per collection, which the search
//! filter is built from.

use crate::document::DocumentShape;
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "admin_session";

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub created_at: DateTime<Utc>,
    shapes: HashMap<String, DocumentShape>,
}

impl Session {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            created_at: Utc::now(),
            shapes: HashMap::new(),
        }
    }

    /// Field names last seen in `collection`, if any document was fetched.
    pub fn shape_for(&self, collection: &str) -> Option<&DocumentShape> {
        self.shapes.get(collection)
    }

    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= ttl
    }
}

/// Live sessions keyed by token. A session expires `ttl` after login.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Start a session and return its token. Expired sessions are dropped.
    pub async fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.ttl, now));
        if sessions.len() < before {
            debug!("Dropped {} expired sessions", before - sessions.len());
        }
        sessions.insert(token.clone(), Session::new(username));
        token
    }

    /// Look up a live session. Expired sessions resolve to `None`.
    pub async fn get(&self, token: &str) -> Option<Session> {
        self.sessions
            .read()
            .await
            .get(token)
            .filter(|session| !session.is_expired(self.ttl, Utc::now()))
            .cloned()
    }

    /// Replace the cached shape for a collection. No-op for unknown tokens.
    pub async fn remember_shape(&self, token: &str, collection: &str, shape: DocumentShape) {
        if shape.is_empty() {
            return;
        }
        if let Some(session) = self.sessions.write().await.get_mut(token) {
            session.shapes.insert(collection.to_string(), shape);
        }
    }

    /// End a session. Returns whether it existed.
    pub async fn remove(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Extract the session token from the `Cookie` request headers.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn cookie_attributes(secure: bool) -> &'static str {
    if secure {
        "HttpOnly; Secure; SameSite=Strict; Path=/"
    } else {
        "HttpOnly; SameSite=Strict; Path=/"
    }
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    format!("{}={}; {}", SESSION_COOKIE, token, cookie_attributes(secure))
}

pub fn expired_session_cookie(secure: bool) -> String {
    format!("{}=; {}; Max-Age=0", SESSION_COOKIE, cookie_attributes(secure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn store() -> SessionStore {
        SessionStore::new(Duration::minutes(60))
    }

    // ==================== SessionStore Tests ====================

    #[tokio::test]
    async fn test_create_and_get_session() {
        let store = store();
        let token = store.create("admin").await;

        let session = store.get(&token).await.expect("Session should exist");
        assert_eq!(session.username, "admin");
        assert!(session.shape_for("posts").is_none());
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let store = store();
        let a = store.create("admin").await;
        let b = store.create("admin").await;

        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_remember_shape_per_collection() {
        let store = store();
        let token = store.create("admin").await;

        let shape: DocumentShape = ["_id", "title"].into_iter().collect();
        store.remember_shape(&token, "posts", shape.clone()).await;

        let session = store.get(&token).await.unwrap();
        assert_eq!(session.shape_for("posts"), Some(&shape));
        assert!(session.shape_for("authors").is_none());
    }

    #[tokio::test]
    async fn test_empty_shape_does_not_overwrite() {
        let store = store();
        let token = store.create("admin").await;
        let shape: DocumentShape = ["title"].into_iter().collect();

        store.remember_shape(&token, "posts", shape.clone()).await;
        store
            .remember_shape(&token, "posts", DocumentShape::default())
            .await;

        let session = store.get(&token).await.unwrap();
        assert_eq!(session.shape_for("posts"), Some(&shape));
    }

    #[tokio::test]
    async fn test_remove_session() {
        let store = store();
        let token = store.create("admin").await;

        assert!(store.remove(&token).await);
        assert!(!store.remove(&token).await);
        assert!(store.get(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let store = SessionStore::new(Duration::zero());
        let token = store.create("admin").await;

        assert!(store.get(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_create_drops_expired_sessions() {
        let store = SessionStore::new(Duration::zero());
        for _ in 0..5 {
            store.create("admin").await;
        }

        // Only the session created last survives the purge
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_live_sessions_are_kept() {
        let store = store();
        let first = store.create("admin").await;
        store.create("admin").await;

        assert_eq!(store.len().await, 2);
        assert!(store.get(&first).await.is_some());
    }

    // ==================== Cookie Tests ====================

    #[test]
    fn test_token_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; admin_session=abc123; lang=en"),
        );

        assert_eq!(token_from_headers(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn test_token_from_headers_missing_or_empty() {
        let mut headers = HeaderMap::new();
        assert_eq!(token_from_headers(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("admin_session="));
        assert_eq!(token_from_headers(&headers), None);
    }

    #[test]
    fn test_session_cookie_format() {
        assert_eq!(
            session_cookie("abc", true),
            "admin_session=abc; HttpOnly; Secure; SameSite=Strict; Path=/"
        );
        assert_eq!(
            session_cookie("abc", false),
            "admin_session=abc; HttpOnly; SameSite=Strict; Path=/"
        );
        assert!(expired_session_cookie(true).contains("Secure"));
        assert!(expired_session_cookie(false).ends_with("Max-Age=0"));
    }
}
