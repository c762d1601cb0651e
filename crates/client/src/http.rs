use std::sync::{Arc, RwLock};

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, ClientResult};
use crate::model::User;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<User>,
}

/// In-process session storage shared by every handle on the same client.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionSlot {
    pub fn token(&self) -> Option<String> {
        self.inner.read().ok().and_then(|s| s.token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.inner.read().ok().and_then(|s| s.user.clone())
    }

    pub fn set(&self, token: String, user: Option<User>) {
        if let Ok(mut s) = self.inner.write() {
            s.token = Some(token);
            s.user = user;
        }
    }

    pub fn set_user(&self, user: User) {
        if let Ok(mut s) = self.inner.write() {
            s.user = Some(user);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut s) = self.inner.write() {
            *s = SessionState::default();
        }
    }
}

/// JSON-over-HTTP client. Cheap to clone; clones share the session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionSlot,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: SessionSlot::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionSlot {
        &self.session
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, fallback: &str) -> ClientResult<T> {
        self.call(self.request(Method::GET, path), fallback).await
    }

    pub async fn get_query<Q: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Q,
        fallback: &str,
    ) -> ClientResult<T> {
        self.call(self.request(Method::GET, path).query(query), fallback).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> ClientResult<T> {
        self.call(self.request(Method::POST, path).json(body), fallback).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
        fallback: &str,
    ) -> ClientResult<T> {
        let mut req = self.request(Method::PUT, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        self.call(req, fallback).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, fallback: &str) -> ClientResult<T> {
        self.call(self.request(Method::DELETE, path), fallback).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let req = self.http.request(method, url);
        match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder, fallback: &str) -> ClientResult<T> {
        let resp = req.send().await?;
        let resp = self.check(resp, fallback).await?;
        Ok(resp.json().await?)
    }

    async fn check(&self, resp: Response, fallback: &str) -> ClientResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = error_message(&body, fallback);

        if status == StatusCode::UNAUTHORIZED {
            tracing::info!("session rejected by server; clearing it");
            self.session.clear();
            return Err(ClientError::Unauthorized(message));
        }
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), %message, "server error");
        }
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// The `error` field of a JSON error body, or `fallback`.
pub fn error_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
