use serde::{Deserialize, Serialize};

/// Request payload for the chat endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Menu the HTML tools should read from and write to.
    #[serde(default)]
    pub menu_id: Option<String>,
}

/// Response payload for the chat endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub thread_id: String,
}

/// Response payload for the health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Response payload for the service root
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// OAuth2 password form posted to `/login`
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

impl ServiceInfo {
    pub fn current() -> Self {
        Self {
            status: "healthy".to_string(),
            service: "Menu Creation Agent API".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ChatRequest {
    /// Validates if the message is not empty or just whitespace
    pub fn is_valid(&self) -> bool {
        !self.message.trim().is_empty()
    }

    /// Client-supplied thread id, ignoring blank values.
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn menu_id(&self) -> Option<String> {
        self.menu_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}
