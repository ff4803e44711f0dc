//! Generic table access over the Supabase REST interface (PostgREST).
//!
//! Everything the service persists goes through [`TableClient`], so tools and
//! thread persistence never see HTTP details.

#[cfg(test)]
pub mod memory;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;

/// Column names under which a menu's HTML may be stored, tried in order after
/// the caller's preferred column.
pub const HTML_FIELD_ALIASES: [&str; 3] = ["html_content", "html", "menu_html"];

/// A filtered, optionally ordered select.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub columns: String,
    pub filters: Vec<(String, String)>,
    pub order: Option<(String, bool)>,
}

impl Query {
    pub fn select(columns: &str) -> Self {
        Self {
            columns: columns.to_string(),
            ..Default::default()
        }
    }

    /// Equality filter (`column=eq.value`).
    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), true));
        self
    }

    fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.replace(' ', ""))];
        params.extend(filter_params(&self.filters));
        if let Some((column, ascending)) = &self.order {
            let dir = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", column, dir)));
        }
        params
    }
}

fn filter_params(filters: &[(String, String)]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(column, value)| (column.clone(), format!("eq.{}", value)))
        .collect()
}

#[async_trait]
pub trait TableClient: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    /// Applies `patch` to every row matching `filters` and returns the updated rows.
    async fn update(&self, table: &str, patch: Value, filters: &[(String, String)]) -> Result<Vec<Value>>;

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>>;
}

pub type SharedTables = Arc<dyn TableClient>;

/// Builds the REST client when Supabase credentials are configured.
pub fn from_config(config: &Config, http: reqwest::Client) -> Option<SharedTables> {
    match (&config.supabase_url, &config.supabase_service_key) {
        (Some(url), Some(key)) => Some(Arc::new(RestTableClient::new(http, url, key))),
        _ => None,
    }
}

pub struct RestTableClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestTableClient {
    pub fn new(http: reqwest::Client, base_url: &str, service_key: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            service_key: service_key.to_string(),
        }
    }

    fn headers(&self, returning: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.service_key)?);
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))?,
        );
        if returning {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }
        Ok(headers)
    }

    async fn rows(response: reqwest::Response, table: &str) -> Result<Vec<Value>> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("{} request on '{}' failed: {}", status, table, body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&body)
            .with_context(|| format!("Invalid JSON from table '{}'", table))?
        {
            Value::Array(rows) => Ok(rows),
            other => Ok(vec![other]),
        }
    }
}

#[async_trait]
impl TableClient for RestTableClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        debug!("select {} from {} where {:?}", query.columns, table, query.filters);
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, table))
            .headers(self.headers(false)?)
            .query(&query.to_params())
            .send()
            .await?;
        Self::rows(response, table).await
    }

    async fn update(&self, table: &str, patch: Value, filters: &[(String, String)]) -> Result<Vec<Value>> {
        debug!("update {} where {:?}", table, filters);
        let response = self
            .http
            .patch(format!("{}/{}", self.base_url, table))
            .headers(self.headers(true)?)
            .query(&filter_params(filters))
            .json(&patch)
            .send()
            .await?;
        Self::rows(response, table).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>> {
        debug!("insert into {}", table);
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, table))
            .headers(self.headers(true)?)
            .json(&row)
            .send()
            .await?;
        Self::rows(response, table).await
    }
}

/// Preferred column first, then the known aliases, without duplicates.
pub fn html_field_candidates(preferred: &str) -> Vec<String> {
    let mut fields = vec![preferred.trim().to_string()];
    for alias in HTML_FIELD_ALIASES {
        if !fields.iter().any(|f| f == alias) {
            fields.push(alias.to_string());
        }
    }
    fields.retain(|f| !f.is_empty());
    fields
}

/// Reads a string-ish column, treating JSON null and missing as absent.
pub fn str_field<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| row.get(*key).and_then(Value::as_str))
}

/// Reads a column that may be a JSON string or number as text (ids are
/// uuids in practice but the REST layer does not care).
pub fn id_field(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let params = Query::select("id, name, items(*)")
            .eq("menu_id", "m1")
            .order_asc("position")
            .to_params();
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "id,name,items(*)".to_string()),
                ("menu_id".to_string(), "eq.m1".to_string()),
                ("order".to_string(), "position.asc".to_string()),
            ]
        );
    }

    #[test]
    fn test_html_field_candidates_dedup() {
        assert_eq!(
            html_field_candidates("html_content"),
            vec!["html_content", "html", "menu_html"]
        );
        assert_eq!(
            html_field_candidates("body_html"),
            vec!["body_html", "html_content", "html", "menu_html"]
        );
    }

    #[test]
    fn test_id_field_accepts_numbers() {
        let row = serde_json::json!({"id": 7, "restaurantId": "r-1"});
        assert_eq!(id_field(&row, &["id"]), Some("7".to_string()));
        assert_eq!(
            id_field(&row, &["restaurant_id", "restaurantId"]),
            Some("r-1".to_string())
        );
    }
}
