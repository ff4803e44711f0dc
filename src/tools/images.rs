use std::path::{Path, PathBuf};
use std::time::Duration;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{BROWSER_USER_AGENT, ToolContext, ToolError, group_digits, invoke};

/// Cache file name for a previewed image: the URL's last segment when it
/// looks like a file, else a name derived from the URL.
pub fn preview_filename(image_url: &str) -> String {
    let last = image_url
        .split('/')
        .next_back()
        .unwrap_or_default()
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let safe = !last.is_empty() && last.contains('.') && last != ".." && !last.contains('\\');
    if safe {
        return last.to_string();
    }
    let digest = format!("{:x}", md5::compute(image_url.as_bytes()));
    format!("preview_{}.jpg", &digest[..8])
}

pub async fn preview_image(ctx: &ToolContext, image_url: &str) -> String {
    let response = match ctx
        .services()
        .http
        .get(image_url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .and_then(|r| r.error_for_status())
    {
        Ok(response) => response,
        Err(e) => return format!("Error fetching image from URL: {}", e),
    };

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    if !content_type.starts_with("image/") {
        return format!(
            "Error: URL does not point to an image. Content-Type: {}",
            content_type
        );
    }

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return format!("Error fetching image from URL: {}", e),
    };
    let filename = preview_filename(image_url);
    let path = ctx.services().cache.images.join(&filename);
    if let Err(e) = tokio::fs::write(&path, &bytes).await {
        return format!("Error processing image: {}", e);
    }

    ctx.queue_image(path, format!("Preview of {}", image_url));
    format!(
        "✓ Image fetched for review:\n  URL: {}\n  Filename: {}\n  Size: {} bytes\n\nThe image is attached below. Review it and decide whether to use it in the menu template.",
        image_url,
        filename,
        group_digits(bytes.len())
    )
}

/// Relative paths are looked up in the image cache first, then against the
/// working directory. Missing files yield `None`.
pub fn resolve_image_path(images_dir: &Path, raw: &str) -> Option<PathBuf> {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Some(name) = path.file_name() {
        let cached = images_dir.join(name);
        if cached.exists() {
            return Some(cached);
        }
    }
    path.exists()
        .then(|| path.canonicalize().unwrap_or_else(|_| path.to_path_buf()))
}

pub fn upload_menu_images(ctx: &ToolContext, image_paths: &str) -> String {
    let entries = match serde_json::from_str::<Value>(image_paths) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => return "Error: image_paths must be a JSON array".to_string(),
        Err(e) => return format!("Error parsing image paths JSON: {}", e),
    };

    let images_dir = &ctx.services().cache.images;
    let resolved: Vec<PathBuf> = entries
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|raw| resolve_image_path(images_dir, raw))
        .collect();
    if resolved.is_empty() {
        return "No images were found or could be processed.".to_string();
    }

    let mut summary = format!("✓ Prepared {} menu images for visual analysis:\n", resolved.len());
    for (i, path) in resolved.iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        summary.push_str(&format!("  {}. {}\n", i + 1, name));
        ctx.queue_image(path.clone(), name);
    }
    summary.push_str(
        "\nThe images are attached below. Use them to read the menu items, descriptions and prices, \
         to understand how the menu is organized, and to note its layout and visual style.\n",
    );
    ctx.set_menu_images(resolved);
    summary
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PreviewImageArgs {
    pub image_url: String,
}

#[derive(Clone)]
pub struct PreviewImageFromUrl {
    ctx: ToolContext,
}

impl PreviewImageFromUrl {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for PreviewImageFromUrl {
    const NAME: &'static str = "PreviewImageFromURL";
    type Error = ToolError;
    type Args = PreviewImageArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Fetches an image from a public URL so you can look at it (logos, dish photos, backgrounds) before using it in the menu template.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "image_url": {
                        "type": "string",
                        "description": "Public URL of the image. Must be accessible without authentication."
                    }
                },
                "required": ["image_url"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = json!({ "image_url": args.image_url });
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            preview_image(&ctx, &args.image_url).await
        })
        .await
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UploadImagesArgs {
    pub image_paths: String,
}

#[derive(Clone)]
pub struct UploadMenuImages {
    ctx: ToolContext,
}

impl UploadMenuImages {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for UploadMenuImages {
    const NAME: &'static str = "UploadMenuImages";
    type Error = ToolError;
    type Args = UploadImagesArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Shows you menu images (PDF page renders, downloaded menu images, screenshots) so you can read their content and study their design.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "image_paths": {
                        "type": "string",
                        "description": "JSON string array of image file paths, e.g. [\"cache/images/menu_page_1.png\"]."
                    }
                },
                "required": ["image_paths"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = json!({ "image_paths": args.image_paths });
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            upload_menu_images(&ctx, &args.image_paths)
        })
        .await
    }
}
