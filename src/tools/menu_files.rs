use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::{BROWSER_USER_AGENT, ToolContext, ToolError, fetch_page, invoke, resolve_http_url};

/// Words that mark a link as leading to a menu, across the languages the
/// restaurants we see publish in.
pub const MENU_KEYWORDS: &[&str] = &[
    "menu",
    "carta",
    "card",
    "food menu",
    "dining menu",
    "restaurant menu",
    "menú",
    "carta de comida",
    "menú del restaurante",
    "carte",
    "carte du restaurant",
    "menù",
    "carta del ristorante",
    "cardápio",
    "speisekarte",
    "karte",
    "food",
    "dishes",
    "platos",
    "piatti",
];

/// English and Spanish entries; a page mentioning one of these is itself a
/// screenshot candidate.
const PAGE_MENTION_KEYWORDS: usize = 9;

const MENU_FILE_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif", "webp"];
const MAX_DOWNLOADS: usize = 5;
const MAX_PAGE_URLS: usize = 3;
const PDF_RENDER_DPI: &str = "144";
const PDF_RENDERER: &str = "pdftoppm";

static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct MenuFileLink {
    pub url: String,
    pub extension: String,
    pub filename: String,
}

#[derive(Debug, Default)]
pub struct MenuLinks {
    pub files: Vec<MenuFileLink>,
    pub pages: Vec<String>,
}

fn mentions_menu(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

pub fn page_mentions_menu(document: &Html) -> bool {
    let text = document.root_element().text().collect::<String>().to_lowercase();
    mentions_menu(&text, &MENU_KEYWORDS[..PAGE_MENTION_KEYWORDS])
}

/// Splits the page's keyword-matching links into downloadable menu files and
/// menu pages. The page itself leads the page list when it talks about menus.
pub fn discover_menu_links(document: &Html, page_url: &Url) -> MenuLinks {
    let mut links = MenuLinks::default();

    for anchor in document.select(&LINKS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = anchor.text().collect::<String>().to_lowercase();
        if !mentions_menu(&text, MENU_KEYWORDS) && !mentions_menu(&href.to_lowercase(), MENU_KEYWORDS) {
            continue;
        }
        let Some(url) = resolve_http_url(page_url, href) else {
            continue;
        };

        let extension = Path::new(url.path())
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if MENU_FILE_EXTENSIONS.contains(&extension.as_str()) {
            let filename = url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("menu_{}.{}", links.files.len(), extension));
            links.files.push(MenuFileLink {
                url: url.to_string(),
                extension: format!(".{}", extension),
                filename,
            });
        } else if !links.pages.iter().any(|p| p == url.as_str()) {
            links.pages.push(url.to_string());
        }
    }

    if page_mentions_menu(document) && !links.pages.iter().any(|p| p == page_url.as_str()) {
        links.pages.insert(0, page_url.to_string());
    }
    links
}

/// Keeps alphanumerics and `._-`, at most 100 characters; falls back to the
/// URL's last path segment, then `menu_file`.
pub fn safe_download_name(filename: &str, url: &str) -> String {
    let safe: String = filename
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(100)
        .collect();
    if !safe.is_empty() {
        return safe;
    }
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| "menu_file".to_string())
}

#[derive(Debug, Serialize)]
pub struct ConvertedPage {
    pub page: usize,
    pub image_path: String,
    pub image_filename: String,
}

#[derive(Debug, Serialize)]
struct DownloadedFile {
    url: String,
    #[serde(rename = "type")]
    kind: &'static str,
    extension: String,
    filename: String,
    original_file: String,
    original_filename: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    converted_images: Vec<ConvertedPage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pages_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PageUrl {
    url: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn pdf_page_count(pdf: &Path) -> Result<usize> {
    let pdf_path = pdf.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<usize> {
        let document = lopdf::Document::load(&pdf_path)
            .with_context(|| format!("Unreadable PDF {}", pdf_path.display()))?;
        Ok(document.get_pages().len())
    })
    .await?
}

/// Renders every page of `pdf` to `<stem>_page_<n>.png` beside `out_dir`.
pub async fn convert_pdf_to_images(pdf: &Path, out_dir: &Path) -> Result<Vec<ConvertedPage>> {
    render_pdf_pages(PDF_RENDERER, pdf, out_dir).await
}

async fn render_pdf_pages(renderer: &str, pdf: &Path, out_dir: &Path) -> Result<Vec<ConvertedPage>> {
    let pages = pdf_page_count(pdf).await?;
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "menu".to_string());

    let mut converted = Vec::with_capacity(pages);
    for page in 1..=pages {
        let prefix = out_dir.join(format!("{}_page_{}", stem, page));
        let number = page.to_string();
        let status = tokio::process::Command::new(renderer)
            .args(["-png", "-r", PDF_RENDER_DPI, "-f", &number, "-l", &number, "-singlefile"])
            .arg(pdf)
            .arg(&prefix)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", renderer))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {} on page {}", renderer, status, page));
        }
        let image_path = prefix.with_extension("png");
        converted.push(ConvertedPage {
            page,
            image_filename: file_name_of(&image_path),
            image_path: image_path.to_string_lossy().into_owned(),
        });
    }
    Ok(converted)
}

/// Entry type of a downloaded file. PDFs that render become `pdf_converted`
/// with their page images; the rest stay `pdf`.
async fn classify_download(path: &Path, images_dir: &Path, renderer: &str) -> (&'static str, Vec<ConvertedPage>) {
    let is_pdf = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return ("image", Vec::new());
    }
    match render_pdf_pages(renderer, path, images_dir).await {
        Ok(pages) if !pages.is_empty() => ("pdf_converted", pages),
        Ok(_) => ("pdf", Vec::new()),
        Err(e) => {
            warn!("PDF conversion failed for {}: {:#}", path.display(), e);
            ("pdf", Vec::new())
        }
    }
}

async fn download(ctx: &ToolContext, link: &MenuFileLink, renderer: &str) -> Result<DownloadedFile> {
    let response = ctx
        .services()
        .http
        .get(&link.url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .timeout(Duration::from_secs(15))
        .send()
        .await?
        .error_for_status()?;
    let bytes = response.bytes().await?;

    let images_dir = &ctx.services().cache.images;
    let path: PathBuf = images_dir.join(safe_download_name(&link.filename, &link.url));
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Downloaded {} ({} bytes)", link.url, bytes.len());

    let (kind, converted_images) = classify_download(&path, images_dir, renderer).await;
    Ok(DownloadedFile {
        url: link.url.clone(),
        kind,
        extension: link.extension.clone(),
        filename: link.filename.clone(),
        original_file: path.to_string_lossy().into_owned(),
        original_filename: file_name_of(&path),
        pages_count: (!converted_images.is_empty()).then_some(converted_images.len()),
        converted_images,
    })
}

pub async fn find_menu_files(ctx: &ToolContext, website_url: &str) -> String {
    let page_url = match Url::parse(website_url) {
        Ok(url) => url,
        Err(e) => return format!("Error fetching website: invalid URL '{}': {}", website_url, e),
    };
    let body = match fetch_page(&ctx.services().http, website_url).await {
        Ok(body) => body,
        Err(e) => return format!("Error fetching website: {}", e),
    };
    let links = discover_menu_links(&Html::parse_document(&body), &page_url);

    let mut menu_files = Vec::new();
    for link in links.files.iter().take(MAX_DOWNLOADS) {
        match download(ctx, link, PDF_RENDERER).await {
            Ok(file) => menu_files.push(file),
            Err(e) => warn!("Skipping menu file {}: {}", link.url, e),
        }
    }
    let pages: Vec<PageUrl> = links
        .pages
        .into_iter()
        .take(MAX_PAGE_URLS)
        .map(|url| PageUrl { url, kind: "page" })
        .collect();

    let result = json!({
        "website_url": website_url,
        "summary": {
            "files_found": menu_files.len(),
            "urls_found": pages.len(),
        },
        "menu_files": menu_files,
        "menu_urls_for_screenshots": pages,
    });
    serde_json::to_string_pretty(&result)
        .unwrap_or_else(|e| format!("Error finding menu files: {}", e))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FindMenuFilesArgs {
    pub website_url: String,
}

#[derive(Clone)]
pub struct FindMenuFiles {
    ctx: ToolContext,
}

impl FindMenuFiles {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for FindMenuFiles {
    const NAME: &'static str = "FindMenuFiles";
    type Error = ToolError;
    type Args = FindMenuFilesArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Searches a restaurant website for menu files (PDFs, images) and menu page URLs. Downloads up to 5 menu files into the image cache, converts PDFs to one PNG per page, and lists up to 3 menu pages to screenshot.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "website_url": {
                        "type": "string",
                        "description": "The URL of the restaurant website to search for menus. Must include http:// or https://"
                    }
                },
                "required": ["website_url"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = json!({ "website_url": args.website_url });
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            find_menu_files(&ctx, &args.website_url).await
        })
        .await
    }
}
