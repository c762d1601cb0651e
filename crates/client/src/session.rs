use serde_json::json;

use crate::error::{ClientError, ClientResult};
use crate::http::ApiClient;
use crate::model::{AuthResponse, User};

/// Login state for one [`ApiClient`].
#[derive(Debug, Clone)]
pub struct Session {
    api: ApiClient,
}

impl Session {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn user(&self) -> Option<User> {
        self.api.session().user()
    }

    pub fn token(&self) -> Option<String> {
        self.api.session().token()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<User> {
        let resp: AuthResponse = self
            .api
            .post(
                "/auth/login",
                &json!({ "email": email, "password": password }),
                "Credenciales inválidas o error de conexión",
            )
            .await?;
        self.api.session().set(resp.token, Some(resp.user.clone()));
        Ok(resp.user)
    }

    pub async fn signup(&self, email: &str, password: &str, confirm_password: &str) -> ClientResult<User> {
        if password != confirm_password {
            return Err(ClientError::validation("Las contraseñas no coinciden"));
        }
        let resp: AuthResponse = self
            .api
            .post(
                "/auth/signup",
                &json!({
                    "email": email,
                    "password": password,
                    "confirm_password": confirm_password,
                }),
                "Error al crear la cuenta",
            )
            .await?;
        self.api.session().set(resp.token, Some(resp.user.clone()));
        Ok(resp.user)
    }

    /// Adopt a token obtained elsewhere (e.g. from the environment).
    pub fn resume(&self, token: impl Into<String>) {
        self.api.session().set(token.into(), None);
    }

    pub fn logout(&self) {
        self.api.session().clear();
    }

    /// Reload the current user. A failure leaves the cached user untouched.
    pub async fn refresh_profile(&self) -> Option<User> {
        if !self.is_authenticated() {
            return None;
        }
        match self.api.get::<User>("/auth/profile", "No se pudo refrescar el perfil").await {
            Ok(user) => {
                self.api.session().set_user(user.clone());
                Some(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "profile refresh failed");
                self.user()
            }
        }
    }
}
