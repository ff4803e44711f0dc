use std::env;
use std::path::PathBuf;

use anyhow::Context;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub cors_origins: Vec<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    pub supabase_jwt_secret: Option<String>,
    pub jwt_secret: Option<String>,
    pub token_ttl_minutes: i64,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub agent_model: String,
    pub agent_max_turns: usize,
    pub cache_dir: PathBuf,
    pub google_cse_api_key: Option<String>,
    pub google_cse_engine_id: Option<String>,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let cors_raw = optional("CORS_ORIGINS").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed("PORT", 8080)?,
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "menu_agent_svc=info,tower_http=debug".to_string()),
            cors_origins: parse_origins(&cors_raw),
            supabase_url: optional("NEXT_PUBLIC_SUPABASE_URL").or_else(|| optional("SUPABASE_URL")),
            supabase_service_key: optional("SUPABASE_SERVICE_ROLE_KEY"),
            supabase_jwt_secret: optional("SUPABASE_JWT_SECRET"),
            jwt_secret: optional("JWT_SECRET_KEY"),
            token_ttl_minutes: parsed("ACCESS_TOKEN_EXPIRE_MINUTES", 30)?,
            auth_username: optional("AUTH_USERNAME"),
            auth_password: optional("AUTH_PASSWORD"),
            openrouter_api_key: optional("OPENROUTER_API_KEY"),
            agent_model: optional("AGENT_MODEL").unwrap_or_else(|| "openai/gpt-5".to_string()),
            agent_max_turns: parsed("AGENT_MAX_TURNS", 20)?,
            cache_dir: optional("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cache")),
            google_cse_api_key: optional("GOOGLE_CSE_API_KEY"),
            google_cse_engine_id: optional("GOOGLE_CSE_ENGINE_ID"),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// `*` means any origin; the CORS layer is then permissive.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }

    pub fn database_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_service_key.is_some()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // secrets are reported by presence only
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("cors_origins", &self.cors_origins)
            .field("supabase_url", &self.supabase_url)
            .field("database", &self.database_configured())
            .field("login_enabled", &self.auth_username.is_some())
            .field("llm_key", &self.openrouter_api_key.is_some())
            .field("agent_model", &self.agent_model)
            .field("agent_max_turns", &self.agent_max_turns)
            .field("cache_dir", &self.cache_dir)
            .field(
                "web_search",
                &(self.google_cse_api_key.is_some() && self.google_cse_engine_id.is_some()),
            )
            .finish()
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    if raw.trim() == "*" {
        return vec!["*".to_string()];
    }
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

#[cfg(test)]
impl Config {
    /// Fully offline configuration for tests.
    pub fn for_tests(cache_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_level: "menu_agent_svc=debug".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            supabase_url: None,
            supabase_service_key: None,
            supabase_jwt_secret: None,
            jwt_secret: Some("test-secret".to_string()),
            token_ttl_minutes: 30,
            auth_username: Some("admin".to_string()),
            auth_password: Some("hunter2".to_string()),
            openrouter_api_key: None,
            agent_model: "test-model".to_string(),
            agent_max_turns: 4,
            cache_dir,
            google_cse_api_key: None,
            google_cse_engine_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(parse_origins("*"), vec!["*"]);
        assert_eq!(
            parse_origins("http://a.com/, https://b.com ,,"),
            vec!["http://a.com", "https://b.com"]
        );
    }
}
