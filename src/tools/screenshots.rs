use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use super::{ToolContext, ToolError, domain_slug, invoke};

/// Accepts `[{"url": ...}, ...]` or `["https://...", ...]`; entries without
/// an http(s) URL are skipped but keep their index.
pub fn parse_menu_urls(raw: &str) -> Result<Vec<(usize, String)>, String> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| format!("Error parsing menu URLs JSON: {}", e))?;
    let Value::Array(entries) = value else {
        return Err("Error: menu_urls must be a JSON array".to_string());
    };

    Ok(entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let url = match entry {
                Value::String(url) => url.as_str(),
                Value::Object(fields) => fields.get("url").and_then(Value::as_str)?,
                _ => return None,
            };
            url.starts_with("http").then(|| (i, url.to_string()))
        })
        .collect())
}

pub fn screenshot_filename(url: &str, index: usize) -> String {
    let domain: String = domain_slug(url).chars().take(50).collect();
    format!("menu_screenshot_{}_{}.png", domain, index)
}

pub async fn take_menu_screenshots(ctx: &ToolContext, menu_urls: &str) -> String {
    let urls = match parse_menu_urls(menu_urls) {
        Ok(urls) => urls,
        Err(message) => return message,
    };
    let Some(browser) = ctx.services().browser.clone() else {
        return "Error taking screenshots: no browser is available in this deployment".to_string();
    };

    let mut screenshots = Vec::new();
    for (index, url) in urls {
        let filename = screenshot_filename(&url, index);
        let path = ctx.services().cache.images.join(&filename);
        match browser.screenshot(url.clone(), path).await {
            Ok(path) => screenshots.push(json!({
                "url": url,
                "screenshot_path": path.to_string_lossy(),
                "screenshot_filename": filename,
            })),
            Err(e) => warn!("Screenshot of {} failed: {}", url, e),
        }
    }

    let result = json!({
        "screenshots_taken": screenshots.len(),
        "screenshots": screenshots,
    });
    serde_json::to_string_pretty(&result).unwrap_or_else(|e| format!("Error taking screenshots: {}", e))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TakeScreenshotsArgs {
    pub menu_urls: String,
}

#[derive(Clone)]
pub struct TakeMenuScreenshots {
    ctx: ToolContext,
}

impl TakeMenuScreenshots {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for TakeMenuScreenshots {
    const NAME: &'static str = "TakeMenuScreenshots";
    type Error = ToolError;
    type Args = TakeScreenshotsArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Takes full-page screenshots of menu page URLs (use after FindMenuFiles) and saves them to the image cache.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "menu_urls": {
                        "type": "string",
                        "description": "JSON string array of menu URLs to screenshot. Format: [{\"url\": \"https://...\", \"type\": \"page\"}, ...]"
                    }
                },
                "required": ["menu_urls"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = json!({ "menu_urls": args.menu_urls });
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            take_menu_screenshots(&ctx, &args.menu_urls).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_menu_urls_mixed_entries() {
        let urls = parse_menu_urls(
            r#"[{"url": "https://a.es/carta", "type": "page"}, "ftp://x", "https://b.es", 42, {"type": "page"}]"#,
        )
        .unwrap();
        assert_eq!(
            urls,
            vec![(0, "https://a.es/carta".to_string()), (2, "https://b.es".to_string())]
        );
    }

    #[test]
    fn test_parse_menu_urls_rejects_non_arrays() {
        assert_eq!(
            parse_menu_urls(r#"{"url": "https://a.es"}"#).unwrap_err(),
            "Error: menu_urls must be a JSON array"
        );
        assert!(parse_menu_urls("not json").unwrap_err().starts_with("Error parsing menu URLs JSON"));
    }

    #[test]
    fn test_screenshot_filename() {
        assert_eq!(
            screenshot_filename("https://www.casapepe.es/carta", 1),
            "menu_screenshot_casapepe_es_1.png"
        );
    }

    #[tokio::test]
    async fn test_without_browser_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::tools::testing::context(dir.path(), None);
        let out = take_menu_screenshots(&ctx, r#"["https://a.es"]"#).await;
        assert!(out.starts_with("Error taking screenshots"));
    }
}
