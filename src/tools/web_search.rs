use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{ToolContext, ToolError, invoke};
use crate::config::Config;

const GOOGLE_CSE_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";
const MAX_RESULTS: usize = 8;

/// Google Custom Search credentials.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub api_key: String,
    pub engine_id: String,
}

impl WebSearchConfig {
    /// `None` unless both the key and the engine id are set.
    pub fn from_config(config: &Config) -> Option<Self> {
        Some(Self {
            api_key: config.google_cse_api_key.clone()?,
            engine_id: config.google_cse_engine_id.clone()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Option<Vec<SearchItem>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchItem {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

async fn retrieve_results(
    http: &reqwest::Client,
    config: &WebSearchConfig,
    query: &str,
) -> anyhow::Result<Vec<SearchItem>> {
    let url = format!(
        "{}?key={}&cx={}&q={}",
        GOOGLE_CSE_BASE_URL,
        config.api_key,
        config.engine_id,
        urlencoding::encode(query)
    );

    info!(
        "Executing Google CSE search with URL: {}",
        url.replace(&config.api_key, "***API_KEY***")
    );

    let response = http.get(&url).send().await?;
    info!("Received response status: {}", response.status());

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(anyhow::anyhow!(
            "Google CSE API request failed: {}",
            error_text
        ));
    }

    let body = response.text().await?;
    debug!("Response body: {}", body);

    let search_response: SearchResponse = serde_json::from_str(&body)?;
    Ok(search_response.items.unwrap_or_default())
}

pub async fn web_search(ctx: &ToolContext, query: &str) -> String {
    let Some(config) = ctx.services().web_search.as_ref() else {
        return "Error: web search is not configured".to_string();
    };
    if query.trim().is_empty() {
        return "Error: query must not be empty".to_string();
    }
    match retrieve_results(&ctx.services().http, config, query).await {
        Ok(items) if items.is_empty() => format!("No results found for: {}", query),
        Ok(items) => {
            let top: Vec<_> = items.into_iter().take(MAX_RESULTS).collect();
            serde_json::to_string_pretty(&json!({ "query": query, "results": top }))
                .unwrap_or_else(|e| format!("Error searching the web: {}", e))
        }
        Err(e) => format!("Error searching the web: {}", e),
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WebSearchArgs {
    pub query: String,
}

#[derive(Clone)]
pub struct WebSearch {
    ctx: ToolContext,
}

impl WebSearch {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for WebSearch {
    const NAME: &'static str = "WebSearch";
    type Error = ToolError;
    type Args = WebSearchArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Searches the web. Useful for finding a restaurant's website, menu pages or logo when they are not known.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = json!({ "query": args.query });
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            web_search(&ctx, &args.query).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_without_items() {
        let response: SearchResponse =
            serde_json::from_str(r#"{"kind": "customsearch#search"}"#).unwrap();
        assert!(response.items.is_none());

        let response: SearchResponse = serde_json::from_str(
            r#"{"items": [{"title": "Casa Pepe", "link": "https://casapepe.es", "displayLink": "casapepe.es"}]}"#,
        )
        .unwrap();
        let items = response.items.unwrap();
        assert_eq!(items[0].link, "https://casapepe.es");
        assert_eq!(items[0].snippet, "");
    }

    #[test]
    fn test_config_requires_key_and_engine() {
        let mut config = Config::for_tests(std::env::temp_dir());
        assert!(WebSearchConfig::from_config(&config).is_none());
        config.google_cse_api_key = Some("key".to_string());
        assert!(WebSearchConfig::from_config(&config).is_none());
        config.google_cse_engine_id = Some("cx".to_string());
        let search = WebSearchConfig::from_config(&config).unwrap();
        assert_eq!(search.engine_id, "cx");
    }

    #[tokio::test]
    async fn test_unconfigured_search() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::tools::testing::context(dir.path(), None);
        assert_eq!(
            web_search(&ctx, "casa pepe").await,
            "Error: web search is not configured"
        );
    }
}
