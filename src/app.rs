use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::agent::{ChatAgent, ChatService, RigMenuAgent};
use crate::auth::Authenticator;
use crate::browser::BrowserPool;
use crate::config::Config;
use crate::db;
use crate::routes::create_routes;
use crate::threads::ThreadStore;
use crate::tools::{CacheDirs, ToolServices, WebSearchConfig};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<Authenticator>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(config: Config, agent: Arc<dyn ChatAgent>, services: Arc<ToolServices>) -> Self {
        let threads = ThreadStore::new(services.tables.clone());
        Self {
            auth: Arc::new(Authenticator::from_config(&config)),
            chat: Arc::new(ChatService::new(agent, services, threads)),
            config: Arc::new(config),
        }
    }
}

/// Initialize tracing and logging for the application
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "menu_agent_svc=info,tower_http=debug,axum::rejection=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Create and configure the Axum application with all routes and middleware
pub async fn create_app(config: Config) -> Result<Router, anyhow::Error> {
    info!("Initializing application router");

    let http = reqwest::Client::builder().cookie_store(true).build()?;
    let cache = CacheDirs::create(&config.cache_dir)?;
    info!("Cache directory ready at {}", config.cache_dir.display());

    let tables = db::from_config(&config, http.clone());
    if tables.is_none() {
        warn!("Supabase credentials not set, database tools and thread persistence are disabled");
    }
    let web_search = WebSearchConfig::from_config(&config);
    if web_search.is_none() {
        info!("Google CSE not configured, WebSearch tool disabled");
    }

    let services = Arc::new(ToolServices {
        http,
        tables,
        browser: Some(BrowserPool::new()),
        cache,
        web_search,
    });
    let agent = Arc::new(RigMenuAgent::from_config(&config)?);
    info!("Menu agent ready with model {}", config.agent_model);

    Ok(build_router(AppState::new(config, agent, services)))
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    create_routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::agent::testing::EchoAgent;

    /// Router over the echo agent with an offline configuration.
    pub fn router(cache_root: &std::path::Path) -> (Router, AppState) {
        let config = Config::for_tests(cache_root.to_path_buf());
        let services = crate::tools::testing::services(cache_root, None);
        let state = AppState::new(config, Arc::new(EchoAgent), services);
        (build_router(state.clone()), state)
    }
}
