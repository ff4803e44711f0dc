//! Tools exposed to the menu creator agent.
//!
//! Every tool returns text. Domain failures (bad input, unreachable sites,
//! missing rows) come back as `Error: ...` strings for the model to read; the
//! only `Err` a tool produces is [`ToolError::Crashed`].

pub mod html_files;
pub mod images;
pub mod menu_data;
pub mod menu_files;
pub mod screenshots;
pub mod styles;
pub mod web_search;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use num_format::{Locale, ToFormattedString};
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::browser::BrowserPool;
use crate::db::{Query, SharedTables, html_field_candidates, str_field};
use crate::events::StreamEvent;

pub use html_files::{ReadHtmlPart, SaveHtmlFile, UpdateHtmlFile};
pub use images::{PreviewImageFromUrl, UploadMenuImages};
pub use menu_data::{PopulateMenuFromDb, SaveMenuToDb};
pub use menu_files::FindMenuFiles;
pub use screenshots::TakeMenuScreenshots;
pub use styles::AnalyzeWebsiteStyles;
pub use web_search::{WebSearch, WebSearchConfig};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const DEFAULT_MENU_FILE: &str = "menu.html";
pub const DEFAULT_POPULATED_FILE: &str = "menu-populated.html";
pub const DEFAULT_HTML_FIELD: &str = "html_content";

const MISSING_DB_CREDENTIALS: &str = "Error: Supabase credentials not found. Please set NEXT_PUBLIC_SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY in .env";
const OUTPUT_PREVIEW_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool {tool} crashed: {reason}")]
    Crashed { tool: &'static str, reason: String },
}

/// Scratch directories under the cache root.
#[derive(Debug, Clone)]
pub struct CacheDirs {
    pub menus: PathBuf,
    pub images: PathBuf,
}

impl CacheDirs {
    pub fn create(root: &Path) -> Result<Self> {
        let dirs = Self {
            menus: root.join("menus"),
            images: root.join("images"),
        };
        std::fs::create_dir_all(&dirs.menus)
            .with_context(|| format!("Failed to create {}", dirs.menus.display()))?;
        std::fs::create_dir_all(&dirs.images)
            .with_context(|| format!("Failed to create {}", dirs.images.display()))?;
        Ok(dirs)
    }
}

/// Long-lived clients shared by every tool invocation.
pub struct ToolServices {
    pub http: reqwest::Client,
    pub tables: Option<SharedTables>,
    pub browser: Option<BrowserPool>,
    pub cache: CacheDirs,
    pub web_search: Option<WebSearchConfig>,
}

/// An image the model should look at after the current tool round.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewImage {
    pub path: PathBuf,
    pub label: String,
}

#[derive(Debug, Default)]
struct TurnState {
    pending_images: Vec<ReviewImage>,
    menu_images: Vec<PathBuf>,
}

/// Per-turn context handed to every tool: shared services, the menu the chat
/// is about, the stream sink, and images waiting for visual review.
#[derive(Clone)]
pub struct ToolContext {
    services: Arc<ToolServices>,
    menu_id: Option<String>,
    events: Option<UnboundedSender<StreamEvent>>,
    state: Arc<Mutex<TurnState>>,
}

impl ToolContext {
    pub fn new(
        services: Arc<ToolServices>,
        menu_id: Option<String>,
        events: Option<UnboundedSender<StreamEvent>>,
    ) -> Self {
        Self {
            services,
            menu_id,
            events,
            state: Arc::default(),
        }
    }

    pub fn services(&self) -> &ToolServices {
        &self.services
    }

    pub fn menu_id(&self) -> Option<&str> {
        self.menu_id.as_deref()
    }

    /// Argument value if given and non-blank, else the chat's menu.
    pub fn resolve_menu_id(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or(self.menu_id())
            .map(str::to_string)
    }

    pub fn emit(&self, event: StreamEvent) {
        if let Some(events) = &self.events {
            // the receiver is gone once the client disconnects
            let _ = events.send(event);
        }
    }

    pub fn queue_image(&self, path: PathBuf, label: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_images.push(ReviewImage {
                path,
                label: label.into(),
            });
        }
    }

    pub fn take_pending_images(&self) -> Vec<ReviewImage> {
        self.state
            .lock()
            .map(|mut state| std::mem::take(&mut state.pending_images))
            .unwrap_or_default()
    }

    pub fn set_menu_images(&self, paths: Vec<PathBuf>) {
        if let Ok(mut state) = self.state.lock() {
            state.menu_images = paths;
        }
    }

    pub fn menu_images(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .map(|state| state.menu_images.clone())
            .unwrap_or_default()
    }
}

/// Runs a tool body on its own task, reporting the call and its output on
/// the event stream.
pub(crate) async fn invoke<F, Fut>(
    ctx: &ToolContext,
    tool: &'static str,
    arguments: Value,
    work: F,
) -> Result<String, ToolError>
where
    F: FnOnce(ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = String> + Send + 'static,
{
    info!("Tool {} called", tool);
    debug!("Tool {} arguments: {}", tool, arguments);
    ctx.emit(StreamEvent::ToolCall {
        tool: tool.to_string(),
        arguments,
    });

    let handle = tokio::spawn(work(ctx.clone()));
    let output = handle.await.map_err(|e| ToolError::Crashed {
        tool,
        reason: e.to_string(),
    })?;

    if output.starts_with("Error") {
        warn!("Tool {} reported: {}", tool, preview(&output, 300));
    } else {
        info!("Tool {} finished ({} characters)", tool, output.len());
    }
    ctx.emit(StreamEvent::ToolOutput {
        tool: tool.to_string(),
        content: preview(&output, OUTPUT_PREVIEW_CHARS),
    });
    Ok(output)
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Reduces a caller-supplied name to a bare `.html` file name inside the cache.
pub fn sanitize_filename(name: &str) -> String {
    let mut name = name.trim().to_string();
    if !name.ends_with(".html") {
        name.push_str(".html");
    }
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = base.replace("..", "");
    if cleaned.is_empty() || cleaned == ".html" {
        DEFAULT_MENU_FILE.to_string()
    } else {
        cleaned
    }
}

pub(crate) async fn fetch_page(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http
        .get(url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .timeout(Duration::from_secs(10))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.text().await?)
}

/// Resolves `href` against the page, keeping only http(s) targets.
pub(crate) fn resolve_http_url(base: &url::Url, href: &str) -> Option<url::Url> {
    base.join(href.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

/// Host of `url` with `www.` removed and dots flattened, for file names.
pub(crate) fn domain_slug(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
        .replace("www.", "")
        .replace('.', "_")
}

pub(crate) fn tables_or_error(ctx: &ToolContext) -> Result<&SharedTables, String> {
    ctx.services()
        .tables
        .as_ref()
        .ok_or_else(|| MISSING_DB_CREDENTIALS.to_string())
}

/// Returns the menu's name, or the agent-facing error text.
pub(crate) async fn verify_menu(tables: &SharedTables, menu_id: &str) -> Result<String, String> {
    let rows = tables
        .select("menus", &Query::select("id, name").eq("id", menu_id))
        .await
        .map_err(|e| format!("Error: Could not verify menu exists: {}", e))?;
    let menu = rows
        .first()
        .ok_or_else(|| format!("Error: Menu with id '{}' not found in database.", menu_id))?;
    Ok(str_field(menu, &["name"]).unwrap_or("Unknown").to_string())
}

/// Writes `html` into the first menu column that accepts it.
pub(crate) async fn store_menu_html(
    tables: &SharedTables,
    menu_id: &str,
    preferred_field: &str,
    html: &str,
) -> Result<String, String> {
    let fields = html_field_candidates(preferred_field);
    let filters = [("id".to_string(), menu_id.to_string())];
    let mut last_error = None;

    for field in &fields {
        let mut patch = Map::new();
        patch.insert(field.clone(), Value::String(html.to_string()));
        match tables.update("menus", Value::Object(patch), &filters).await {
            Ok(rows) if !rows.is_empty() => {
                debug!("Stored menu {} HTML in column {}", menu_id, field);
                return Ok(field.clone());
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Column {} rejected for menu {}: {}", field, menu_id, e);
                last_error = Some(e.to_string());
            }
        }
    }

    let mut message = format!(
        "Error: Could not save HTML to database. Tried fields: {}.",
        fields.join(", ")
    );
    if let Some(e) = last_error {
        message.push_str(&format!(" Last error: {}.", e));
    }
    message.push_str(&format!(
        " You may need to add an '{}' column to the menus table.",
        preferred_field
    ));
    Err(message)
}

/// First non-empty HTML column of a menu, with the column it came from.
pub(crate) async fn load_menu_html(
    tables: &SharedTables,
    menu_id: &str,
    preferred_field: &str,
) -> Option<(String, String)> {
    for field in html_field_candidates(preferred_field) {
        let query = Query::select(&format!("id, name, {}", field)).eq("id", menu_id);
        let Ok(rows) = tables.select("menus", &query).await else {
            continue;
        };
        if let Some(html) = rows
            .first()
            .and_then(|row| str_field(row, &[field.as_str()]))
            .filter(|html| !html.is_empty())
        {
            return Some((html.to_string(), field));
        }
    }
    None
}

/// Thousands separators for the size lines in tool summaries.
pub(crate) fn group_digits(n: usize) -> String {
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn services(cache_root: &Path, tables: Option<SharedTables>) -> Arc<ToolServices> {
        Arc::new(ToolServices {
            http: reqwest::Client::builder().no_proxy().build().unwrap(),
            tables,
            browser: None,
            cache: CacheDirs::create(cache_root).unwrap(),
            web_search: None,
        })
    }

    pub fn context(cache_root: &Path, tables: Option<SharedTables>) -> ToolContext {
        ToolContext::new(services(cache_root, tables), None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_strips_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd.html");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini.html");
        assert_eq!(sanitize_filename("menus/../x.html"), "x.html");
        assert_eq!(sanitize_filename("a..b.html"), "ab.html");
        assert_eq!(sanitize_filename("carta"), "carta.html");
    }

    #[test]
    fn test_sanitize_filename_fallback() {
        assert_eq!(sanitize_filename(""), "menu.html");
        assert_eq!(sanitize_filename("../"), "menu.html");
        assert_eq!(sanitize_filename(".."), "menu.html");
    }

    #[test]
    fn test_domain_slug() {
        assert_eq!(domain_slug("https://www.casa-pepe.es/carta"), "casa-pepe_es");
        assert_eq!(domain_slug("not a url"), "");
    }

    #[test]
    fn test_group_digits() {
        assert_eq!(group_digits(7), "7");
        assert_eq!(group_digits(1234), "1,234");
        assert_eq!(group_digits(1234567), "1,234,567");
        assert_eq!(group_digits(0), "0");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("menú del día", 4), "menú...");
        assert_eq!(preview("short", 10), "short");
    }

    #[tokio::test]
    async fn test_pending_images_drain_once() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path(), None);
        ctx.queue_image(PathBuf::from("a.png"), "a");
        let shared = ctx.clone();
        shared.queue_image(PathBuf::from("b.png"), "b");

        let drained = ctx.take_pending_images();
        assert_eq!(drained.len(), 2);
        assert!(ctx.take_pending_images().is_empty());
    }

    #[test]
    fn test_resolve_menu_id_prefers_argument() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(
            testing::services(dir.path(), None),
            Some("ctx-menu".to_string()),
            None,
        );
        assert_eq!(ctx.resolve_menu_id(Some("arg")), Some("arg".to_string()));
        assert_eq!(ctx.resolve_menu_id(Some("  ")), Some("ctx-menu".to_string()));
        assert_eq!(ctx.resolve_menu_id(None), Some("ctx-menu".to_string()));
    }
}
