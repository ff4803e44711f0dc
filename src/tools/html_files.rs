use std::path::Path;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    DEFAULT_HTML_FIELD, DEFAULT_MENU_FILE, ToolContext, ToolError, group_digits, invoke,
    load_menu_html, sanitize_filename, store_menu_html, tables_or_error, verify_menu,
};
use crate::html::{HtmlPart, ensure_mobile_optimized_html, extract_part};

fn default_menu_file() -> String {
    DEFAULT_MENU_FILE.to_string()
}

fn default_html_field() -> String {
    DEFAULT_HTML_FIELD.to_string()
}

fn default_part() -> String {
    "all".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Creates or overwrites.
    Save,
    /// Refuses to create a missing file.
    Update,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WriteHtmlArgs {
    pub html_content: String,
    #[serde(default = "default_menu_file")]
    pub filename: String,
    #[serde(default)]
    pub menu_id: Option<String>,
    #[serde(default = "default_html_field")]
    pub field_name: String,
}

async fn write_html(ctx: &ToolContext, args: &WriteHtmlArgs, mode: WriteMode) -> String {
    let html = ensure_mobile_optimized_html(&args.html_content);
    let size = html.chars().count();

    if let Some(menu_id) = ctx.resolve_menu_id(args.menu_id.as_deref()) {
        let tables = match tables_or_error(ctx) {
            Ok(tables) => tables,
            Err(message) => return message,
        };
        let menu_name = match verify_menu(tables, &menu_id).await {
            Ok(name) => name,
            Err(message) => return message,
        };
        let field = match store_menu_html(tables, &menu_id, &args.field_name, &html).await {
            Ok(field) => field,
            Err(message) => return message,
        };
        return match mode {
            WriteMode::Save => format!(
                "✓ HTML saved successfully to database!\n\nMenu ID: {}\nMenu Name: {}\nField: {}\nHTML Size: {} characters\n\nThe HTML is now stored in the database and will persist across instances.",
                menu_id,
                menu_name,
                field,
                group_digits(size)
            ),
            WriteMode::Update => format!(
                "✓ HTML updated successfully in database!\n\nMenu ID: {}\nMenu Name: {}\nField: {}\nNew HTML Size: {} characters",
                menu_id,
                menu_name,
                field,
                group_digits(size)
            ),
        };
    }

    let filename = sanitize_filename(&args.filename);
    let path = ctx.services().cache.menus.join(&filename);
    if mode == WriteMode::Update && !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return format!(
            "Error: File '{}' not found. Use SaveHTMLFile to create a new file.",
            filename
        );
    }
    if let Err(e) = tokio::fs::write(&path, &html).await {
        return match mode {
            WriteMode::Save => format!("Error saving HTML: {}", e),
            WriteMode::Update => format!("Error updating HTML: {}", e),
        };
    }

    match mode {
        WriteMode::Save => format!(
            "HTML file saved successfully to: {}\nFile size: {} characters\n\nNote: provide menu_id to save to the database instead.",
            path.display(),
            size
        ),
        WriteMode::Update => format!(
            "HTML file updated successfully: {}\nNew file size: {} characters\n\nNote: provide menu_id to update the database instead.",
            path.display(),
            size
        ),
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReadHtmlArgs {
    #[serde(default = "default_part")]
    pub part: String,
    #[serde(default = "default_menu_file")]
    pub filename: String,
    #[serde(default)]
    pub menu_id: Option<String>,
    #[serde(default = "default_html_field")]
    pub field_name: String,
}

async fn read_from_db(ctx: &ToolContext, menu_id: &str, field_name: &str) -> Result<String, String> {
    let tables = tables_or_error(ctx)?;
    if let Some((html, _field)) = load_menu_html(tables, menu_id, field_name).await {
        return Ok(html);
    }
    let menu_name = verify_menu(tables, menu_id).await?;
    Err(format!(
        "Error: Menu '{}' found but HTML content is not stored in database. Use SaveHTMLFile with menu_id to save HTML first.",
        menu_name
    ))
}

async fn read_from_file(menus_dir: &Path, filename: &str) -> Result<String, String> {
    let path = menus_dir.join(filename);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(format!(
            "Menu file '{}' not found. Use SaveHTMLFile to create a new menu.",
            filename
        ));
    }
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| format!("Error reading HTML part: {}", e))
}

pub async fn read_html_part(ctx: &ToolContext, args: &ReadHtmlArgs) -> String {
    let menu_id = ctx.resolve_menu_id(args.menu_id.as_deref());
    let filename = sanitize_filename(&args.filename);

    let loaded = match &menu_id {
        Some(menu_id) => read_from_db(ctx, menu_id, &args.field_name).await,
        None => read_from_file(&ctx.services().cache.menus, &filename).await,
    };
    let html = match loaded {
        Ok(html) => html,
        Err(message) => return message,
    };
    if html.is_empty() {
        let source = if menu_id.is_some() { "database" } else { "file system" };
        return format!("Error: No HTML content found in {}.", source);
    }

    let part = HtmlPart::parse(&args.part);
    if part == HtmlPart::All {
        let source = match &menu_id {
            Some(id) => format!(" (from database, menu_id: {})", id),
            None => format!(" (from file: {})", filename),
        };
        return format!(
            "Full menu content ({} characters){}:\n\n{}",
            html.chars().count(),
            source,
            html
        );
    }
    extract_part(&html, &part)
}

fn write_parameters(action: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "html_content": {
                "type": "string",
                "description": format!("The complete HTML content to {}.", action)
            },
            "filename": {
                "type": "string",
                "description": "File name in the menu cache, used only without a menu_id. Defaults to 'menu.html'."
            },
            "menu_id": {
                "type": "string",
                "description": "UUID of the menu whose stored HTML should be written. When set (or known from the chat), the database is used instead of the file system."
            },
            "field_name": {
                "type": "string",
                "description": "Database column holding the HTML. Defaults to 'html_content'; html and menu_html are tried as fallbacks."
            }
        },
        "required": ["html_content"]
    })
}

#[derive(Clone)]
pub struct SaveHtmlFile {
    ctx: ToolContext,
}

impl SaveHtmlFile {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for SaveHtmlFile {
    const NAME: &'static str = "SaveHTMLFile";
    type Error = ToolError;
    type Args = WriteHtmlArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Saves menu HTML to the database (when a menu_id is available) or to the local menu cache. The HTML is hardened for mobile screens before saving.".to_string(),
            parameters: write_parameters("save"),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = json!({
            "filename": args.filename,
            "menu_id": args.menu_id,
            "field_name": args.field_name,
            "html_size": args.html_content.len(),
        });
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            write_html(&ctx, &args, WriteMode::Save).await
        })
        .await
    }
}

#[derive(Clone)]
pub struct UpdateHtmlFile {
    ctx: ToolContext,
}

impl UpdateHtmlFile {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for UpdateHtmlFile {
    const NAME: &'static str = "UpdateHTMLFile";
    type Error = ToolError;
    type Args = WriteHtmlArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Replaces the HTML of an existing menu, in the database (when a menu_id is available) or in the local menu cache. Will not create a new file.".to_string(),
            parameters: write_parameters("write"),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = json!({
            "filename": args.filename,
            "menu_id": args.menu_id,
            "field_name": args.field_name,
            "html_size": args.html_content.len(),
        });
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            write_html(&ctx, &args, WriteMode::Update).await
        })
        .await
    }
}

#[derive(Clone)]
pub struct ReadHtmlPart {
    ctx: ToolContext,
}

impl ReadHtmlPart {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for ReadHtmlPart {
    const NAME: &'static str = "ReadHTMLPart";
    type Error = ToolError;
    type Args = ReadHtmlArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Reads part of the menu HTML from the database (when a menu_id is available) or from the local menu cache.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "part": {
                        "type": "string",
                        "description": "Which part to read: 'all', 'header', 'sections', 'footer', 'styles', or a section name such as 'Appetizers'."
                    },
                    "filename": {
                        "type": "string",
                        "description": "File name in the menu cache, used only without a menu_id. Defaults to 'menu.html'."
                    },
                    "menu_id": {
                        "type": "string",
                        "description": "UUID of the menu to read from the database."
                    },
                    "field_name": {
                        "type": "string",
                        "description": "Database column holding the HTML. Defaults to 'html_content'."
                    }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = serde_json::to_value(&args).unwrap_or_default();
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            read_html_part(&ctx, &args).await
        })
        .await
    }
}
