//! Menu content from the database: template population and HTML persistence.

use anyhow::{Context, Result};
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{
    DEFAULT_HTML_FIELD, DEFAULT_MENU_FILE, DEFAULT_POPULATED_FILE, ToolContext, ToolError,
    group_digits, invoke, load_menu_html, sanitize_filename, store_menu_html, tables_or_error,
    verify_menu,
};
use crate::db::{Query, SharedTables, id_field, str_field};

const DEFAULT_CURRENCY: &str = "EUR";

/// `1250` -> `12.5`, `1200` -> `12`, `0` -> `0`.
pub fn format_price(cents: i64) -> String {
    let formatted = format!("{:.2}", cents as f64 / 100.0);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuCategory {
    pub name: String,
    pub description: String,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuRecord {
    pub id: String,
    pub name: String,
    pub restaurant_name: Option<String>,
    pub categories: Vec<MenuCategory>,
}

fn text(row: &Value, keys: &[&str]) -> String {
    str_field(row, keys).unwrap_or_default().to_string()
}

fn item_from_row(row: &Value) -> Option<MenuItem> {
    let visible = ["is_visible", "isVisible"]
        .iter()
        .find_map(|k| row.get(*k).and_then(Value::as_bool))
        .unwrap_or(true);
    if !visible {
        return None;
    }
    let price_cents = ["price_cents", "priceCents"]
        .iter()
        .find_map(|k| {
            let value = row.get(*k)?;
            value.as_i64().or_else(|| value.as_f64().map(|f| f.round() as i64))
        })
        .unwrap_or(0);
    Some(MenuItem {
        name: text(row, &["name"]),
        description: text(row, &["description"]),
        price_cents,
        currency: str_field(row, &["currency"])
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_string(),
    })
}

fn category_from_row(row: &Value) -> MenuCategory {
    let mut rows: Vec<&Value> = row
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default();
    rows.sort_by_key(|item| item.get("position").and_then(Value::as_i64).unwrap_or(i64::MAX));

    MenuCategory {
        name: text(row, &["name"]),
        description: text(row, &["description"]),
        items: rows.into_iter().filter_map(item_from_row).collect(),
    }
}

pub async fn fetch_menu(tables: &SharedTables, menu_id: &str) -> Result<Option<MenuRecord>> {
    let menus = tables
        .select("menus", &Query::select("*").eq("id", menu_id))
        .await
        .context("Failed to load menu")?;
    let Some(menu) = menus.into_iter().next() else {
        return Ok(None);
    };

    let restaurant_name = match id_field(&menu, &["restaurant_id", "restaurantId"]) {
        Some(restaurant_id) => tables
            .select("restaurants", &Query::select("name").eq("id", restaurant_id))
            .await
            .context("Failed to load restaurant")?
            .first()
            .and_then(|r| str_field(r, &["name"]))
            .map(str::to_string),
        None => None,
    };

    let categories = tables
        .select(
            "categories",
            &Query::select("*, items(*)")
                .eq("menu_id", menu_id)
                .order_asc("position"),
        )
        .await
        .context("Failed to load categories")?;

    Ok(Some(MenuRecord {
        id: id_field(&menu, &["id"]).unwrap_or_else(|| menu_id.to_string()),
        name: text(&menu, &["name"]),
        restaurant_name,
        categories: categories.iter().map(category_from_row).collect(),
    }))
}

/// The restaurant's default menu, or its first one.
pub async fn fetch_default_menu(tables: &SharedTables, restaurant_id: &str) -> Result<Option<MenuRecord>> {
    let menus = tables
        .select("menus", &Query::select("*").eq("restaurant_id", restaurant_id))
        .await
        .context("Failed to load restaurant menus")?;
    let is_default = |m: &&Value| {
        ["is_default", "isDefault"]
            .iter()
            .any(|k| m.get(*k).and_then(Value::as_bool).unwrap_or(false))
    };
    let Some(menu_id) = menus
        .iter()
        .find(is_default)
        .or(menus.first())
        .and_then(|m| id_field(m, &["id"]))
    else {
        return Ok(None);
    };
    fetch_menu(tables, &menu_id).await
}

/// Mustache data for a menu. Both prefixed (`itemName`) and plain (`name`)
/// keys are provided so templates can use either.
pub fn template_data(menu: &MenuRecord) -> Value {
    let restaurant_name = menu
        .restaurant_name
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| Some(menu.name.clone()).filter(|n| !n.is_empty()))
        .unwrap_or_else(|| "Restaurant".to_string());

    let categories: Vec<Value> = menu
        .categories
        .iter()
        .map(|category| {
            let items: Vec<Value> = category
                .items
                .iter()
                .map(|item| {
                    let price = format_price(item.price_cents);
                    json!({
                        "itemName": item.name,
                        "itemDescription": item.description,
                        "itemPrice": price,
                        "itemCurrency": item.currency,
                        "name": item.name,
                        "description": item.description,
                        "price": price,
                        "currency": item.currency,
                    })
                })
                .collect();
            json!({
                "categoryName": category.name,
                "categoryDescription": category.description,
                "name": category.name,
                "description": category.description,
                "items": items,
            })
        })
        .collect();

    json!({
        "restaurantName": restaurant_name,
        "restaurant": { "name": restaurant_name },
        "categories": categories,
    })
}

pub fn render_template(template: &str, data: &Value) -> Result<String> {
    let compiled = mustache::compile_str(template).context("Invalid Mustache template")?;
    compiled
        .render_to_string(data)
        .context("Failed to render Mustache template")
}

fn default_populated_file() -> String {
    DEFAULT_POPULATED_FILE.to_string()
}

fn default_template_file() -> String {
    DEFAULT_MENU_FILE.to_string()
}

fn default_html_field() -> String {
    DEFAULT_HTML_FIELD.to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PopulateArgs {
    #[serde(default)]
    pub menu_id: Option<String>,
    #[serde(default)]
    pub restaurant_id: Option<String>,
    #[serde(default = "default_template_file")]
    pub template_filename: String,
    #[serde(default = "default_populated_file")]
    pub output_filename: String,
}

async fn load_template(ctx: &ToolContext, tables: &SharedTables, menu_id: &str, filename: &str) -> Result<String, String> {
    let path = ctx.services().cache.menus.join(filename);
    match tokio::fs::read_to_string(&path).await {
        Ok(template) => Ok(template),
        Err(e) => {
            debug!("Template {} unavailable ({}), trying stored menu HTML", path.display(), e);
            load_menu_html(tables, menu_id, DEFAULT_HTML_FIELD)
                .await
                .map(|(html, _)| html)
                .ok_or_else(|| format!("Error: Template file not found: {}", path.display()))
        }
    }
}

pub async fn populate_menu(ctx: &ToolContext, args: &PopulateArgs) -> String {
    let restaurant_id = args
        .restaurant_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let menu_id = match args.menu_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => Some(id.to_string()),
        None if restaurant_id.is_some() => None,
        None => ctx.menu_id().map(str::to_string),
    };
    if menu_id.is_none() && restaurant_id.is_none() {
        return "Error: Either menu_id or restaurant_id must be provided".to_string();
    }
    let tables = match tables_or_error(ctx) {
        Ok(tables) => tables,
        Err(message) => return message,
    };

    let fetched = match (&menu_id, restaurant_id) {
        (Some(menu_id), _) => fetch_menu(tables, menu_id).await.map(|m| {
            m.ok_or_else(|| format!("Error: Menu with id '{}' not found in database.", menu_id))
        }),
        (None, Some(restaurant_id)) => fetch_default_menu(tables, restaurant_id).await.map(|m| {
            m.ok_or_else(|| format!("Error: No menu found for restaurant with id '{}'.", restaurant_id))
        }),
        (None, None) => return "Error: Either menu_id or restaurant_id must be provided".to_string(),
    };
    let menu = match fetched {
        Ok(Ok(menu)) => menu,
        Ok(Err(message)) => return message,
        Err(e) => return format!("Error: Could not fetch menu data from database: {:#}", e),
    };

    let template_name = sanitize_filename(&args.template_filename);
    let template = match load_template(ctx, tables, &menu.id, &template_name).await {
        Ok(template) => template,
        Err(message) => return message,
    };

    let data = template_data(&menu);
    let populated = match render_template(&template, &data) {
        Ok(html) => html,
        Err(e) => return format!("Error populating menu: {:#}", e),
    };

    let output_path = ctx.services().cache.menus.join(sanitize_filename(&args.output_filename));
    if let Err(e) = tokio::fs::write(&output_path, &populated).await {
        return format!("Error populating menu: {}", e);
    }

    let categories_count = menu.categories.len();
    let total_items: usize = menu.categories.iter().map(|c| c.items.len()).sum();
    let mut summary = json!({
        "success": true,
        "output_file": output_path.to_string_lossy(),
        "restaurant_name": data["restaurantName"],
        "categories_count": categories_count,
        "total_items": total_items,
        "message": format!(
            "Menu populated successfully with {} categories and {} items",
            categories_count, total_items
        ),
    });

    match screenshot_populated(ctx, &output_path).await {
        Some(screenshot) => {
            let name = screenshot
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ctx.queue_image(screenshot, format!("Populated menu {}", name));
            format!(
                "{}\n\n✓ Screenshot saved: {}\n\n\
                 The populated menu is attached as an image. Review it for layout issues \
                 (spacing, alignment, overflow), design inconsistencies, missing or broken \
                 images, text truncation or wrapping, and responsive problems. If anything \
                 is off, update the template ({}) and populate again.",
                serde_json::to_string_pretty(&summary).unwrap_or_default(),
                name,
                template_name
            )
        }
        None => {
            summary["screenshot_note"] = json!("Screenshot could not be generated");
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        }
    }
}

async fn screenshot_populated(ctx: &ToolContext, html_path: &std::path::Path) -> Option<std::path::PathBuf> {
    let browser = ctx.services().browser.clone()?;
    let absolute = tokio::fs::canonicalize(html_path).await.ok()?;
    let file_url = url::Url::from_file_path(&absolute).ok()?;
    match browser
        .screenshot(file_url.to_string(), absolute.with_extension("png"))
        .await
    {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Screenshot of populated menu failed: {}", e);
            None
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SaveMenuArgs {
    #[serde(default)]
    pub menu_id: Option<String>,
    #[serde(default)]
    pub html_content: Option<String>,
    #[serde(default)]
    pub html_filename: Option<String>,
    #[serde(default = "default_html_field")]
    pub field_name: String,
}

pub async fn save_menu_to_db(ctx: &ToolContext, args: &SaveMenuArgs) -> String {
    let Some(menu_id) = ctx.resolve_menu_id(args.menu_id.as_deref()) else {
        return "Error: menu_id must be provided".to_string();
    };

    let html = match args.html_content.as_deref().filter(|h| !h.is_empty()) {
        Some(html) => html.to_string(),
        None => {
            let filename = sanitize_filename(
                args.html_filename
                    .as_deref()
                    .unwrap_or(DEFAULT_POPULATED_FILE),
            );
            let path = ctx.services().cache.menus.join(filename);
            match tokio::fs::read_to_string(&path).await {
                Ok(html) => html,
                Err(_) => {
                    return format!(
                        "Error: HTML file not found: {}. Please provide html_content or ensure the file exists.",
                        path.display()
                    );
                }
            }
        }
    };
    if html.is_empty() {
        return "Error: No HTML content provided and file is empty.".to_string();
    }

    let tables = match tables_or_error(ctx) {
        Ok(tables) => tables,
        Err(message) => return message,
    };
    let menu_name = match verify_menu(tables, &menu_id).await {
        Ok(name) => name,
        Err(message) => return message,
    };
    match store_menu_html(tables, &menu_id, &args.field_name, &html).await {
        Ok(field) => format!(
            "✓ Menu HTML saved successfully to database!\n\nMenu ID: {}\nMenu Name: {}\nField: {}\nHTML Size: {} characters\n\nThe menu HTML is now stored in the database and can be retrieved later.",
            menu_id,
            menu_name,
            field,
            group_digits(html.chars().count())
        ),
        Err(message) => message,
    }
}

#[derive(Clone)]
pub struct PopulateMenuFromDb {
    ctx: ToolContext,
}

impl PopulateMenuFromDb {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for PopulateMenuFromDb {
    const NAME: &'static str = "PopulateMenuFromDB";
    type Error = ToolError;
    type Args = PopulateArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Renders a Mustache menu template with the menu's data from the database (restaurant name, categories, visible items, prices) and screenshots the result for review. \
Variables: {{restaurantName}}, {{#categories}} {{categoryName}} {{categoryDescription}} {{#items}} {{itemName}} {{itemDescription}} {{itemPrice}} {{itemCurrency}} {{/items}} {{/categories}}. \
Only data is provided; logos, images, colors and fonts belong in the template.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "menu_id": {
                        "type": "string",
                        "description": "UUID of the menu. Defaults to the menu of the current chat."
                    },
                    "restaurant_id": {
                        "type": "string",
                        "description": "UUID of the restaurant; its default menu is used when menu_id is not given."
                    },
                    "template_filename": {
                        "type": "string",
                        "description": "Mustache template in the menu cache. Defaults to 'menu.html'."
                    },
                    "output_filename": {
                        "type": "string",
                        "description": "Output file in the menu cache. Defaults to 'menu-populated.html'."
                    }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = serde_json::to_value(&args).unwrap_or_default();
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            populate_menu(&ctx, &args).await
        })
        .await
    }
}

#[derive(Clone)]
pub struct SaveMenuToDb {
    ctx: ToolContext,
}

impl SaveMenuToDb {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for SaveMenuToDb {
    const NAME: &'static str = "SaveMenuToDB";
    type Error = ToolError;
    type Args = SaveMenuArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Stores finished menu HTML in the menus table, from html_content or from a file in the menu cache (default 'menu-populated.html').".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "menu_id": {
                        "type": "string",
                        "description": "UUID of the menu to update. Defaults to the menu of the current chat."
                    },
                    "html_content": {
                        "type": "string",
                        "description": "The HTML to store. If omitted, html_filename is read."
                    },
                    "html_filename": {
                        "type": "string",
                        "description": "File in the menu cache to store. Defaults to 'menu-populated.html'."
                    },
                    "field_name": {
                        "type": "string",
                        "description": "Database column for the HTML: 'html_content', 'html' or 'menu_html'. Defaults to 'html_content'."
                    }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = json!({
            "menu_id": args.menu_id,
            "html_filename": args.html_filename,
            "field_name": args.field_name,
            "html_size": args.html_content.as_ref().map(String::len),
        });
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            save_menu_to_db(&ctx, &args).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::TableClient;
    use crate::db::memory::MemoryTables;
    use crate::tools::testing;

    const TEMPLATE: &str = "<h1>{{restaurantName}}</h1>{{#categories}}<section><h2>{{categoryName}}</h2>{{#items}}<p>{{itemName}} {{itemPrice}} {{itemCurrency}}</p>{{/items}}</section>{{/categories}}";

    fn database() -> Arc<MemoryTables> {
        Arc::new(
            MemoryTables::new()
                .with_table(
                    "restaurants",
                    &["id", "name"],
                    vec![json!({"id": "r1", "name": "Casa & Pepe"})],
                )
                .with_table(
                    "menus",
                    &["id", "name", "restaurant_id", "is_default", "html_content"],
                    vec![
                        json!({"id": "m0", "name": "Brunch", "restaurant_id": "r1", "is_default": false, "html_content": null}),
                        json!({"id": "m1", "name": "Carta", "restaurant_id": "r1", "is_default": true, "html_content": null}),
                    ],
                )
                .with_table(
                    "categories",
                    &["id", "name", "description", "menu_id", "position"],
                    vec![
                        json!({"id": "c2", "name": "Postres", "description": null, "menu_id": "m1", "position": 2}),
                        json!({"id": "c1", "name": "Entrantes", "description": "Para compartir", "menu_id": "m1", "position": 1}),
                    ],
                )
                .with_table(
                    "items",
                    &["id", "name", "description", "price_cents", "currency", "is_visible", "category_id", "position"],
                    vec![
                        json!({"id": "i1", "name": "Croquetas", "price_cents": 850, "currency": "EUR", "is_visible": true, "category_id": "c1", "position": 2}),
                        json!({"id": "i2", "name": "Pan", "priceCents": 200, "category_id": "c1", "position": 1}),
                        json!({"id": "i3", "name": "Oculto", "price_cents": 100, "is_visible": false, "category_id": "c1"}),
                        json!({"id": "i4", "name": "Flan", "price_cents": 450, "currency": "USD", "category_id": "c2"}),
                    ],
                ),
        )
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(1250), "12.5");
        assert_eq!(format_price(1200), "12");
        assert_eq!(format_price(1299), "12.99");
        assert_eq!(format_price(5), "0.05");
        assert_eq!(format_price(0), "0");
    }

    #[tokio::test]
    async fn test_fetch_menu_orders_and_filters() {
        let tables: SharedTables = database();
        let menu = fetch_menu(&tables, "m1").await.unwrap().unwrap();

        assert_eq!(menu.restaurant_name.as_deref(), Some("Casa & Pepe"));
        let names: Vec<_> = menu.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Entrantes", "Postres"]);

        let entrantes = &menu.categories[0];
        let items: Vec<_> = entrantes.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(items, vec!["Pan", "Croquetas"]);
        assert_eq!(entrantes.items[0].price_cents, 200);
        assert_eq!(entrantes.items[0].currency, "EUR");
        assert_eq!(menu.categories[1].description, "");

        assert!(fetch_menu(&tables, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_menu_for_restaurant() {
        let tables: SharedTables = database();
        let menu = fetch_default_menu(&tables, "r1").await.unwrap().unwrap();
        assert_eq!(menu.id, "m1");
        assert!(fetch_default_menu(&tables, "r9").await.unwrap().is_none());
    }

    #[test]
    fn test_render_template_escapes_and_loops() {
        let menu = MenuRecord {
            id: "m1".into(),
            name: "Carta".into(),
            restaurant_name: Some("Casa & Pepe".into()),
            categories: vec![MenuCategory {
                name: "Entrantes".into(),
                description: String::new(),
                items: vec![MenuItem {
                    name: "Croquetas".into(),
                    description: String::new(),
                    price_cents: 850,
                    currency: "EUR".into(),
                }],
            }],
        };
        let html = render_template(TEMPLATE, &template_data(&menu)).unwrap();
        assert_eq!(
            html,
            "<h1>Casa &amp; Pepe</h1><section><h2>Entrantes</h2><p>Croquetas 8.5 EUR</p></section>"
        );
    }

    #[test]
    fn test_template_data_falls_back_to_menu_name() {
        let menu = MenuRecord {
            id: "m1".into(),
            name: "Carta".into(),
            restaurant_name: None,
            categories: Vec::new(),
        };
        let data = template_data(&menu);
        assert_eq!(data["restaurantName"], "Carta");
        assert_eq!(data["restaurant"]["name"], "Carta");
    }

    #[tokio::test]
    async fn test_populate_writes_output_without_browser() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path(), Some(database() as SharedTables));
        std::fs::write(dir.path().join("menus/menu.html"), TEMPLATE).unwrap();

        let args = PopulateArgs {
            menu_id: None,
            restaurant_id: Some("r1".into()),
            template_filename: default_template_file(),
            output_filename: default_populated_file(),
        };
        let out = populate_menu(&ctx, &args).await;
        let summary: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(summary["categories_count"], 2);
        assert_eq!(summary["total_items"], 3);
        assert_eq!(summary["screenshot_note"], "Screenshot could not be generated");

        let html = std::fs::read_to_string(dir.path().join("menus/menu-populated.html")).unwrap();
        assert!(html.contains("<p>Pan 2 EUR</p><p>Croquetas 8.5 EUR</p>"));
        assert!(html.contains("<p>Flan 4.5 USD</p>"));
        assert!(ctx.take_pending_images().is_empty());
    }

    #[tokio::test]
    async fn test_populate_falls_back_to_stored_template() {
        let dir = tempfile::tempdir().unwrap();
        let tables = database();
        tables
            .update(
                "menus",
                json!({"html_content": "<title>{{restaurantName}}</title>"}),
                &[("id".to_string(), "m1".to_string())],
            )
            .await
            .unwrap();
        let ctx = ToolContext::new(
            testing::services(dir.path(), Some(tables as SharedTables)),
            Some("m1".to_string()),
            None,
        );

        let args = PopulateArgs {
            menu_id: None,
            restaurant_id: None,
            template_filename: "missing.html".into(),
            output_filename: "out".into(),
        };
        let out = populate_menu(&ctx, &args).await;
        assert!(out.contains("\"success\": true"), "{}", out);
        let html = std::fs::read_to_string(dir.path().join("menus/out.html")).unwrap();
        assert_eq!(html, "<title>Casa &amp; Pepe</title>");
    }

    #[tokio::test]
    async fn test_populate_requires_a_menu() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path(), Some(database() as SharedTables));
        let args = PopulateArgs {
            menu_id: None,
            restaurant_id: None,
            template_filename: default_template_file(),
            output_filename: default_populated_file(),
        };
        assert_eq!(
            populate_menu(&ctx, &args).await,
            "Error: Either menu_id or restaurant_id must be provided"
        );

        let args = PopulateArgs {
            menu_id: Some("zz".into()),
            ..args
        };
        assert_eq!(
            populate_menu(&ctx, &args).await,
            "Error: Menu with id 'zz' not found in database."
        );
    }

    #[tokio::test]
    async fn test_save_menu_to_db_from_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let tables = database();
        let ctx = testing::context(dir.path(), Some(tables.clone() as SharedTables));

        let args = SaveMenuArgs {
            menu_id: Some("m1".into()),
            html_content: None,
            html_filename: None,
            field_name: default_html_field(),
        };
        let out = save_menu_to_db(&ctx, &args).await;
        assert!(out.starts_with("Error: HTML file not found"));

        std::fs::write(dir.path().join("menus/menu-populated.html"), "<p>listo</p>").unwrap();
        let out = save_menu_to_db(&ctx, &args).await;
        assert!(out.starts_with("✓ Menu HTML saved successfully to database!"), "{}", out);
        assert!(out.contains("Field: html_content"));

        let stored = tables
            .rows("menus")
            .into_iter()
            .find(|m| m["id"] == "m1")
            .unwrap();
        assert_eq!(stored["html_content"], "<p>listo</p>");
    }
}
