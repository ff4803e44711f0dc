//! Style extraction from a restaurant's public website: colors, typography,
//! imagery and layout hints that the agent reuses when designing the menu.

use once_cell::sync::Lazy;
use regex::Regex;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::menu_files::discover_menu_links;
use super::{ToolContext, ToolError, domain_slug, fetch_page, invoke};

const EMBEDDED_CSS_LIMIT: usize = 5000;
const DEFAULT_PRIMARY_FONT: &str = "Arial, sans-serif";
const MAX_MENU_SCREENSHOTS: usize = 3;

const NAMED_COLORS: &str =
    "black|white|red|blue|green|yellow|orange|purple|pink|gray|grey|brown|navy|teal";

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})\b").unwrap());
static RGB_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"rgba?\([^)]+\)").unwrap());
static NAMED_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b({})\b", NAMED_COLORS)).unwrap());
static FONT_FAMILY: Lazy<Regex> = Lazy::new(|| Regex::new(r"font-family:\s*([^;}]+)").unwrap());
static FONT_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"font-size:\s*([^;}]+)").unwrap());
static FONT_WEIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"font-weight:\s*([^;}]+)").unwrap());
static FONT_FAMILY_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"family=([^&]+)").unwrap());
static BACKGROUND_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"background-image:\s*url\(([^)]+)\)").unwrap());
static PADDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"padding:\s*([^;]+)").unwrap());
static MARGIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"margin:\s*([^;]+)").unwrap());
static MAX_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"max-width:\s*([^;]+)").unwrap());
static CONTAINER_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"container|wrapper|content|main").unwrap());

static STYLED: Lazy<Selector> = Lazy::new(|| Selector::parse("[style]").unwrap());
static STYLESHEETS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel~=stylesheet][href]").unwrap());
static STYLE_TAGS: Lazy<Selector> = Lazy::new(|| Selector::parse("style").unwrap());
static BGCOLOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[bgcolor], section[bgcolor], header[bgcolor], body[bgcolor]").unwrap()
});
static LINKS_WITH_HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("link[href]").unwrap());
static IMAGES: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static CLASSED_BLOCKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[class], section[class]").unwrap());

/// CSS gathered from a page before analysis.
#[derive(Debug, Default)]
pub struct CssSources {
    pub inline: Vec<String>,
    pub external: Vec<String>,
    pub embedded: Option<String>,
}

pub fn collect_css(document: &Html, base: &Url) -> CssSources {
    let inline = document
        .select(&STYLED)
        .filter_map(|el| el.value().attr("style"))
        .map(str::to_string)
        .collect();
    let external = document
        .select(&STYLESHEETS)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(String::from)
        .collect();
    let embedded: String = document
        .select(&STYLE_TAGS)
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
        .chars()
        .take(EMBEDDED_CSS_LIMIT)
        .collect();

    CssSources {
        inline,
        external,
        embedded: (!embedded.trim().is_empty()).then_some(embedded),
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Hex (3-digit expanded to 6), `rgb()`/`rgba()` and named colors in `css`.
pub fn parse_colors(css: &str) -> Vec<String> {
    let mut colors = Vec::new();
    for caps in HEX_COLOR.captures_iter(css) {
        let hex = &caps[1];
        let color = if hex.len() == 3 {
            let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
            format!("#{}", expanded)
        } else {
            format!("#{}", hex)
        };
        push_unique(&mut colors, color);
    }
    for m in RGB_COLOR.find_iter(css) {
        push_unique(&mut colors, m.as_str().to_string());
    }
    for m in NAMED_COLOR.find_iter(css) {
        push_unique(&mut colors, m.as_str().to_lowercase());
    }
    colors
}

#[derive(Debug, Default, Serialize)]
pub struct ColorPalette {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub accent: Vec<String>,
    pub all_colors: Vec<String>,
}

impl ColorPalette {
    fn from_found(found: Vec<String>) -> Self {
        let slice = |from: usize, min_len: usize| {
            if found.len() >= min_len {
                found[from..min_len].to_vec()
            } else {
                Vec::new()
            }
        };
        Self {
            primary: found.iter().take(3).cloned().collect(),
            secondary: slice(3, 6),
            accent: slice(6, 9),
            all_colors: found.iter().take(20).cloned().collect(),
        }
    }
}

pub fn extract_colors(document: &Html, css: &CssSources) -> ColorPalette {
    let mut found = Vec::new();
    for style in &css.inline {
        for color in parse_colors(style) {
            push_unique(&mut found, color);
        }
    }
    if let Some(embedded) = &css.embedded {
        for color in parse_colors(embedded) {
            push_unique(&mut found, color);
        }
    }
    for el in document.select(&BGCOLOR) {
        if let Some(color) = el.value().attr("bgcolor") {
            push_unique(&mut found, color.trim().to_string());
        }
    }
    ColorPalette::from_found(found)
}

/// `"Open Sans", Arial, 'x'` -> `["Open Sans", "Arial", "x"]`.
fn split_families(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(|f| f.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
        .filter(|f| !f.is_empty())
}

/// Families requested by a Google Fonts stylesheet URL.
pub fn google_font_families(href: &str) -> Vec<String> {
    FONT_FAMILY_PARAM
        .captures_iter(href)
        .flat_map(|caps| {
            let raw = caps[1].replace('+', " ");
            let decoded = match urlencoding::decode(&raw) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => raw.clone(),
            };
            decoded
                .split('|')
                .map(|family| family.split(':').next().unwrap_or_default().trim().to_string())
                .filter(|family| !family.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[derive(Debug, Default, Serialize)]
pub struct Typography {
    pub font_families: Vec<String>,
    pub font_sizes: Vec<String>,
    pub font_weights: Vec<String>,
    pub primary_font: String,
}

pub fn extract_typography(document: &Html, css: &CssSources) -> Typography {
    let mut families = Vec::new();
    let mut sizes = Vec::new();
    let mut weights = Vec::new();

    for style in &css.inline {
        if let Some(caps) = FONT_FAMILY.captures(style) {
            split_families(&caps[1]).for_each(|f| push_unique(&mut families, f));
        }
        if let Some(caps) = FONT_SIZE.captures(style) {
            push_unique(&mut sizes, caps[1].trim().to_string());
        }
        if let Some(caps) = FONT_WEIGHT.captures(style) {
            push_unique(&mut weights, caps[1].trim().to_string());
        }
    }
    if let Some(embedded) = &css.embedded {
        for caps in FONT_FAMILY.captures_iter(embedded) {
            split_families(&caps[1]).for_each(|f| push_unique(&mut families, f));
        }
    }
    for link in document.select(&LINKS_WITH_HREF) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if href.contains("fonts.googleapis.com") || href.contains("fonts.gstatic.com") {
            google_font_families(href)
                .into_iter()
                .for_each(|f| push_unique(&mut families, f));
        }
    }

    families.truncate(10);
    sizes.truncate(10);
    weights.truncate(5);
    Typography {
        primary_font: families
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_PRIMARY_FONT.to_string()),
        font_families: families,
        font_sizes: sizes,
        font_weights: weights,
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ImageAssets {
    pub logos: Vec<String>,
    pub hero_images: Vec<String>,
    pub background_images: Vec<String>,
    pub food_images: Vec<String>,
    pub all_images: Vec<String>,
}

pub fn extract_images(document: &Html, css: &CssSources, base: &Url) -> ImageAssets {
    let mut images = ImageAssets::default();

    for img in document.select(&IMAGES) {
        let el = img.value();
        let Some(src) = el
            .attr("src")
            .or_else(|| el.attr("data-src"))
            .or_else(|| el.attr("data-lazy-src"))
            .filter(|s| !s.trim().is_empty())
        else {
            continue;
        };
        let Ok(url) = base.join(src.trim()) else {
            continue;
        };
        let url = String::from(url);
        let alt = el.attr("alt").unwrap_or_default().to_lowercase();
        let class = el.attr("class").unwrap_or_default().to_lowercase();

        if alt.contains("logo") || class.contains("logo") {
            images.logos.push(url.clone());
        } else if alt.contains("hero") || class.contains("hero") || class.contains("banner") {
            images.hero_images.push(url.clone());
        } else if ["food", "dish", "menu"].iter().any(|k| alt.contains(k)) {
            images.food_images.push(url.clone());
        }
        images.all_images.push(url);
    }

    for style in &css.inline {
        if let Some(caps) = BACKGROUND_IMAGE.captures(style) {
            let raw = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
            if let Ok(url) = base.join(raw) {
                let url = String::from(url);
                images.background_images.push(url.clone());
                images.all_images.push(url);
            }
        }
    }

    for list in [
        &mut images.logos,
        &mut images.hero_images,
        &mut images.background_images,
        &mut images.food_images,
        &mut images.all_images,
    ] {
        list.truncate(10);
    }
    images
}

#[derive(Debug, Default, Serialize)]
pub struct Layout {
    pub max_width: Option<String>,
    pub padding_patterns: Vec<String>,
    pub margin_patterns: Vec<String>,
    pub container_class: Option<Vec<String>>,
}

pub fn extract_layout(document: &Html, css: &CssSources) -> Layout {
    let container_class = document
        .select(&CLASSED_BLOCKS)
        .filter_map(|el| el.value().attr("class"))
        .find(|class| CONTAINER_CLASS.is_match(class))
        .map(|class| class.split_whitespace().map(str::to_string).collect());

    let capture = |re: &Regex, style: &str| re.captures(style).map(|c| c[1].trim().to_string());
    Layout {
        max_width: css.inline.iter().find_map(|s| capture(&MAX_WIDTH, s)),
        padding_patterns: css.inline.iter().filter_map(|s| capture(&PADDING, s)).collect(),
        margin_patterns: css.inline.iter().filter_map(|s| capture(&MARGIN, s)).collect(),
        container_class,
    }
}

pub fn determine_theme(colors: &ColorPalette, typography: &Typography) -> String {
    let mut indicators = Vec::new();

    if let Some(primary) = colors.primary.first() {
        let primary = primary.to_lowercase();
        if ["#000", "black", "dark"].iter().any(|c| primary.contains(c)) {
            indicators.push("dark");
        } else if ["#fff", "white", "light"].iter().any(|c| primary.contains(c)) {
            indicators.push("light");
        }
    }

    let font = typography.primary_font.to_lowercase();
    if ["serif", "times", "georgia"].iter().any(|f| font.contains(f)) {
        indicators.push("classic");
    } else if ["sans", "arial", "helvetica"].iter().any(|f| font.contains(f)) {
        indicators.push("modern");
    }

    if indicators.is_empty() {
        "modern, clean".to_string()
    } else {
        indicators.join(", ")
    }
}

#[derive(Debug, Serialize)]
pub struct PageStyles {
    pub colors: ColorPalette,
    pub typography: Typography,
    pub images: ImageAssets,
    pub layout: Layout,
    pub external_stylesheets: Vec<String>,
    pub css_snippets: serde_json::Value,
    pub design_theme: String,
}

/// All style signals of an already fetched page.
pub fn analyze_document(document: &Html, base: &Url) -> PageStyles {
    let css = collect_css(document, base);
    let colors = extract_colors(document, &css);
    let typography = extract_typography(document, &css);
    let images = extract_images(document, &css, base);
    let layout = extract_layout(document, &css);
    let design_theme = determine_theme(&colors, &typography);
    let css_snippets = match &css.embedded {
        Some(embedded) => json!({ "embedded_css": embedded }),
        None => json!({}),
    };

    PageStyles {
        colors,
        typography,
        images,
        layout,
        external_stylesheets: css.external,
        css_snippets,
        design_theme,
    }
}

#[derive(Debug, Serialize)]
struct MenuScreenshot {
    url: String,
    screenshot_path: String,
    screenshot_filename: String,
}

async fn screenshot_menu_pages(ctx: &ToolContext, urls: Vec<String>) -> Vec<MenuScreenshot> {
    let Some(browser) = ctx.services().browser.clone() else {
        debug!("No browser available, skipping menu screenshots");
        return Vec::new();
    };

    let mut shots = Vec::new();
    for (i, url) in urls.into_iter().take(MAX_MENU_SCREENSHOTS).enumerate() {
        let filename = format!("menu_{}_{}.png", domain_slug(&url), i);
        let path = ctx.services().cache.images.join(&filename);
        match browser.screenshot(url.clone(), path).await {
            Ok(path) => shots.push(MenuScreenshot {
                url,
                screenshot_path: path.to_string_lossy().into_owned(),
                screenshot_filename: filename,
            }),
            Err(e) => warn!("Screenshot of {} failed: {}", url, e),
        }
    }
    shots
}

pub async fn analyze_website_styles(ctx: &ToolContext, website_url: &str, take_screenshots: bool) -> String {
    let base = match Url::parse(website_url) {
        Ok(url) => url,
        Err(e) => return format!("Error fetching website: invalid URL '{}': {}", website_url, e),
    };
    let body = match fetch_page(&ctx.services().http, website_url).await {
        Ok(body) => body,
        Err(e) => return format!("Error fetching website: {}", e),
    };

    let (styles, menu_urls) = {
        let document = Html::parse_document(&body);
        let styles = analyze_document(&document, &base);
        let menu_urls = if take_screenshots {
            discover_menu_links(&document, &base).pages
        } else {
            Vec::new()
        };
        (styles, menu_urls)
    };

    let menu_screenshots = screenshot_menu_pages(ctx, menu_urls).await;

    let mut result = match serde_json::to_value(&styles) {
        Ok(value) => value,
        Err(e) => return format!("Error analyzing website: {}", e),
    };
    result["website_url"] = json!(website_url);
    result["menu_screenshots"] = json!(menu_screenshots);
    serde_json::to_string_pretty(&result).unwrap_or_else(|e| format!("Error analyzing website: {}", e))
}

fn default_take_screenshots() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnalyzeStylesArgs {
    pub website_url: String,
    #[serde(default = "default_take_screenshots")]
    pub take_screenshots: bool,
}

#[derive(Clone)]
pub struct AnalyzeWebsiteStyles {
    ctx: ToolContext,
}

impl AnalyzeWebsiteStyles {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

impl Tool for AnalyzeWebsiteStyles {
    const NAME: &'static str = "AnalyzeWebsiteStyles";
    type Error = ToolError;
    type Args = AnalyzeStylesArgs;
    type Output = String;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Analyzes a restaurant website and extracts its color palette, typography, images (logos, hero, food, backgrounds), layout patterns and overall design theme. Optionally screenshots up to 3 menu pages found on the site.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "website_url": {
                        "type": "string",
                        "description": "The URL of the restaurant website to analyze. Must include http:// or https://"
                    },
                    "take_screenshots": {
                        "type": "boolean",
                        "description": "Whether to search for menu pages and take screenshots. Defaults to true."
                    }
                },
                "required": ["website_url"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let arguments = serde_json::to_value(&args).unwrap_or_default();
        invoke(&self.ctx, Self::NAME, arguments, move |ctx| async move {
            analyze_website_styles(&ctx, &args.website_url, args.take_screenshots).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html>
<head>
  <link rel="stylesheet" href="/css/site.css">
  <link href="https://fonts.googleapis.com/css2?family=Playfair+Display:wght@400;700&family=Lato&display=swap" rel="stylesheet">
  <style>
    body { background: #1A1A1A; color: rgb(240, 240, 240); font-family: "Lato", sans-serif; }
    h1 { font-family: 'Playfair Display', Georgia, serif }
  </style>
</head>
<body bgcolor="#fafafa">
  <div class="site-wrapper main" style="max-width: 1100px; padding: 0 24px">
    <img src="/img/logo.svg" alt="Casa Pepe logo">
    <img data-src="hero.jpg" class="Hero-Banner">
    <img src="https://cdn.casapepe.es/paella.jpg" alt="Paella dish">
    <section style="background-image: url('/img/bg.png'); margin: 12px auto; color: #abc">
      <h1 style="font-family: Georgia, serif; font-size: 32px; font-weight: 700">Casa Pepe</h1>
    </section>
  </div>
</body>
</html>"##;

    fn analyzed() -> PageStyles {
        let base = Url::parse("https://casapepe.es/").unwrap();
        analyze_document(&Html::parse_document(PAGE), &base)
    }

    #[test]
    fn test_parse_colors_hex_rgb_named() {
        let colors = parse_colors("color:#abc; border: 1px solid #A1B2C3; background: rgba(0, 0, 0, 0.5); outline: White");
        assert_eq!(colors, vec!["#aabbcc", "#A1B2C3", "rgba(0, 0, 0, 0.5)", "white"]);
    }

    #[test]
    fn test_parse_colors_ignores_partial_words_and_bare_hex() {
        assert!(parse_colors("abc; reddish; backgrounds").is_empty());
        assert_eq!(parse_colors("#12345678"), vec!["#12345678"]);
        assert!(parse_colors("#abcd").is_empty());
    }

    #[test]
    fn test_palette_split() {
        let palette = ColorPalette::from_found((0..7).map(|i| format!("#00000{}", i)).collect());
        assert_eq!(palette.primary.len(), 3);
        assert_eq!(palette.secondary.len(), 3);
        assert!(palette.accent.is_empty());
        assert_eq!(palette.all_colors.len(), 7);
    }

    #[test]
    fn test_colors_from_page() {
        let styles = analyzed();
        let all = &styles.colors.all_colors;
        assert!(all.contains(&"#aabbcc".to_string()));
        assert!(all.contains(&"#1A1A1A".to_string()));
        assert!(all.contains(&"rgb(240, 240, 240)".to_string()));
        assert!(all.contains(&"#fafafa".to_string()));
    }

    #[test]
    fn test_typography_from_page() {
        let typography = analyzed().typography;
        // inline styles come first, then embedded CSS, then Google Fonts
        assert_eq!(typography.primary_font, "Georgia");
        assert_eq!(
            typography.font_families,
            vec!["Georgia", "serif", "Lato", "sans-serif", "Playfair Display"]
        );
        assert_eq!(typography.font_sizes, vec!["32px"]);
        assert_eq!(typography.font_weights, vec!["700"]);
    }

    #[test]
    fn test_google_font_families() {
        assert_eq!(
            google_font_families("https://fonts.googleapis.com/css?family=Open+Sans:400,700|Roboto+Slab"),
            vec!["Open Sans", "Roboto Slab"]
        );
    }

    #[test]
    fn test_images_from_page() {
        let images = analyzed().images;
        assert_eq!(images.logos, vec!["https://casapepe.es/img/logo.svg"]);
        assert_eq!(images.hero_images, vec!["https://casapepe.es/hero.jpg"]);
        assert_eq!(images.food_images, vec!["https://cdn.casapepe.es/paella.jpg"]);
        assert_eq!(images.background_images, vec!["https://casapepe.es/img/bg.png"]);
        assert_eq!(images.all_images.len(), 4);
    }

    #[test]
    fn test_layout_from_page() {
        let styles = analyzed();
        assert_eq!(styles.layout.max_width.as_deref(), Some("1100px"));
        assert_eq!(styles.layout.padding_patterns, vec!["0 24px"]);
        assert_eq!(styles.layout.margin_patterns, vec!["12px auto"]);
        assert_eq!(
            styles.layout.container_class,
            Some(vec!["site-wrapper".to_string(), "main".to_string()])
        );
        assert_eq!(styles.external_stylesheets[0], "https://casapepe.es/css/site.css");
    }

    #[test]
    fn test_theme() {
        let dark = ColorPalette::from_found(vec!["#000000".into()]);
        let serif = Typography {
            primary_font: "Georgia".into(),
            ..Default::default()
        };
        assert_eq!(determine_theme(&dark, &serif), "dark, classic");

        let light = ColorPalette::from_found(vec!["white".into()]);
        let sans = Typography {
            primary_font: "Helvetica".into(),
            ..Default::default()
        };
        assert_eq!(determine_theme(&light, &sans), "light, modern");

        let none = ColorPalette::default();
        let plain = Typography {
            primary_font: "Comic".into(),
            ..Default::default()
        };
        assert_eq!(determine_theme(&none, &plain), "modern, clean");
    }
}
