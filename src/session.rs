//! In-memory login sessions keyed by an opaque cookie token. Sessions live
//! until logout or process restart.

use axum::http::{header, HeaderMap};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::User;

pub const SESSION_COOKIE: &str = "trainhub_session";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

/// One-shot message shown on the next page render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    /// Snapshot of the user row taken at login.
    pub user: User,
    pub flash: Option<Flash>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, user: User) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions
            .write()
            .await
            .insert(token.clone(), Session { user, flash: None });
        token
    }

    pub async fn get(&self, token: &str) -> Option<Session> {
        self.sessions.read().await.get(token).cloned()
    }

    pub async fn set_flash(&self, token: &str, flash: Flash) {
        if let Some(session) = self.sessions.write().await.get_mut(token) {
            session.flash = Some(flash);
        }
    }

    pub async fn take_flash(&self, token: &str) -> Option<Flash> {
        self.sessions
            .write()
            .await
            .get_mut(token)
            .and_then(|s| s.flash.take())
    }

    pub async fn replace_user(&self, token: &str, user: User) {
        if let Some(session) = self.sessions.write().await.get_mut(token) {
            session.user = user;
        }
    }

    pub async fn remove(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Session token from the request's `Cookie` headers, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token)
}

pub fn expired_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;
    use axum::http::HeaderValue;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            name: "Nour".to_string(),
            email: "nour@x.io".to_string(),
            password: "pw".to_string(),
            phone: String::new(),
            role: Role::Trainee,
            assigned_trainer_id: None,
        }
    }

    #[test]
    fn token_is_found_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; trainhub_session=abc123; lang=ar"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_or_empty_cookie_gives_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("trainhub_session="));
        assert_eq!(session_token(&headers), None);
    }

    #[tokio::test]
    async fn flash_is_shown_once() {
        let store = SessionStore::new();
        let token = store.create(user()).await;
        store.set_flash(&token, Flash::success("saved")).await;

        assert_eq!(store.take_flash(&token).await, Some(Flash::success("saved")));
        assert_eq!(store.take_flash(&token).await, None);
    }

    #[tokio::test]
    async fn removed_session_is_gone() {
        let store = SessionStore::new();
        let token = store.create(user()).await;
        assert!(store.get(&token).await.is_some());
        assert!(store.remove(&token).await);
        assert!(store.get(&token).await.is_none());
        assert_eq!(store.len().await, 0);
    }
}
