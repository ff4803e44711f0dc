//! Pure HTML transforms used by the menu persistence tools.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Present in the injected CSS; its presence means the document was already hardened.
pub const MOBILE_BASELINE_MARKER: &str = "menoo-mobile-baseline v1";
pub const MOBILE_VIEWPORT_CONTENT: &str = "width=device-width, initial-scale=1, viewport-fit=cover";

pub const MOBILE_BASELINE_CSS: &str = "/* menoo-mobile-baseline v1
   viewport-fit safe areas, no horizontal overflow, stable box model and text sizing
*/
*, *::before, *::after { box-sizing: border-box; }
html { -webkit-text-size-adjust: 100%; text-size-adjust: 100%; }
body { margin: 0; overflow-x: hidden; }
img, svg, video, canvas { max-width: 100%; height: auto; }
h1, h2, h3, h4, h5, h6, p, li, dt, dd { overflow-wrap: anywhere; }
pre, code { white-space: pre-wrap; word-break: break-word; overflow-wrap: anywhere; }
";

static HEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").unwrap());
static HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head\s*>").unwrap());
static BODY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body[\s>]").unwrap());
static VIEWPORT_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta\b[^>]*\bname\s*=\s*["']?viewport\b[^>]*>"#).unwrap()
});
// `charset` must be an attribute of its own, not text inside another attribute's value.
static CHARSET_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<meta(?:\s+[^\s"'=>/]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*\s+charset\s*=[^>]*>"#,
    )
    .unwrap()
});
static STYLE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<style(?:\s[^>]*)?>").unwrap());

fn viewport_tag() -> String {
    format!(r#"<meta name="viewport" content="{}">"#, MOBILE_VIEWPORT_CONTENT)
}

/// End offset (exclusive) of the head's content, given where it starts.
fn head_content_end(html: &str, start: usize) -> usize {
    let rest = &html[start..];
    HEAD_CLOSE
        .find(rest)
        .or_else(|| BODY_OPEN.find(rest))
        .map(|m| start + m.start())
        .unwrap_or(html.len())
}

/// Ensures a mobile-correct viewport and the baseline CSS in the document head.
///
/// Documents without a `<head>` are returned unchanged. Only the viewport tag
/// and the first `<style>` of the head are touched, and running the transform
/// on its own output is a no-op.
pub fn ensure_mobile_optimized_html(html: &str) -> String {
    let Some(open) = HEAD_OPEN.find(html) else {
        return html.to_string();
    };
    let head_start = open.end();
    let mut out = html.to_string();

    let head_end = head_content_end(&out, head_start);
    let head = &out[head_start..head_end];
    match VIEWPORT_META.find(head) {
        Some(m) => {
            let range = head_start + m.start()..head_start + m.end();
            out.replace_range(range, &viewport_tag());
        }
        None => {
            let at = CHARSET_META
                .find(head)
                .map(|m| head_start + m.end())
                .unwrap_or(head_start);
            out.insert_str(at, &viewport_tag());
        }
    }

    let head_end = head_content_end(&out, head_start);
    let head = &out[head_start..head_end];
    if !head.contains(MOBILE_BASELINE_MARKER) {
        match STYLE_OPEN.find(head) {
            Some(m) => {
                let at = head_start + m.end();
                out.insert_str(at, &format!("{}\n", MOBILE_BASELINE_CSS));
            }
            None => {
                out.insert_str(head_end, &format!("<style>{}</style>", MOBILE_BASELINE_CSS));
            }
        }
    }

    out
}

/// Which slice of a menu document to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlPart {
    All,
    Header,
    Footer,
    Styles,
    Sections,
    Named(String),
}

impl HtmlPart {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "all" => HtmlPart::All,
            "header" => HtmlPart::Header,
            "footer" => HtmlPart::Footer,
            "styles" => HtmlPart::Styles,
            "sections" => HtmlPart::Sections,
            _ => HtmlPart::Named(raw.trim().to_string()),
        }
    }
}

static HEADER: Lazy<Selector> = Lazy::new(|| Selector::parse("header, .menu-header").unwrap());
static FOOTER: Lazy<Selector> = Lazy::new(|| Selector::parse("footer, .menu-footer").unwrap());
static STYLE: Lazy<Selector> = Lazy::new(|| Selector::parse("style").unwrap());
static SECTION: Lazy<Selector> = Lazy::new(|| Selector::parse("section.menu-section").unwrap());
static SECTION_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h2, .section-title").unwrap());

fn section_title(section: &ElementRef) -> Option<String> {
    section
        .select(&SECTION_TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
}

/// Extracts the requested part as agent-readable text. Missing parts produce a
/// message rather than an error.
pub fn extract_part(html: &str, part: &HtmlPart) -> String {
    if *part == HtmlPart::All {
        return html.to_string();
    }

    let document = Html::parse_document(html);
    match part {
        HtmlPart::All => unreachable!(),
        HtmlPart::Header => match document.select(&HEADER).next() {
            Some(header) => format!("Header section:\n\n{}", header.html()),
            None => "Header section not found in menu.".to_string(),
        },
        HtmlPart::Footer => match document.select(&FOOTER).next() {
            Some(footer) => format!("Footer section:\n\n{}", footer.html()),
            None => "Footer section not found in menu.".to_string(),
        },
        HtmlPart::Styles => match document.select(&STYLE).next() {
            Some(style) => format!("CSS Styles:\n\n{}", style.text().collect::<String>()),
            None => "Styles section not found in menu.".to_string(),
        },
        HtmlPart::Sections => {
            let sections: Vec<_> = document.select(&SECTION).collect();
            if sections.is_empty() {
                return "No menu sections found.".to_string();
            }
            let mut result = format!("Found {} menu sections:\n\n", sections.len());
            for (i, section) in sections.iter().enumerate() {
                let title = section_title(section).unwrap_or_else(|| format!("Section {}", i + 1));
                result.push_str(&format!("{}. {}\n", i + 1, title));
            }
            result
        }
        HtmlPart::Named(name) => {
            let needle = name.to_lowercase();
            document
                .select(&SECTION)
                .find(|section| {
                    section_title(section).is_some_and(|t| t.to_lowercase().contains(&needle))
                })
                .map(|section| format!("Section '{}':\n\n{}", name, section.html()))
                .unwrap_or_else(|| {
                    format!(
                        "Section '{}' not found. Available sections: Use 'sections' to list all sections.",
                        name
                    )
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Menu</title></head>
<body><header class="menu-header"><h1>Casa</h1></header>
<section class="menu-section"><h2>Entrantes</h2><p>Croquetas</p></section>
<section class="menu-section"><h2>Postres</h2><p>Flan</p></section>
<footer>Gracias</footer></body>
</html>"#;

    #[test]
    fn test_hardening_is_idempotent() {
        let once = ensure_mobile_optimized_html(PAGE);
        let twice = ensure_mobile_optimized_html(&once);
        assert_eq!(once, twice);
        assert_eq!(once.matches(MOBILE_BASELINE_MARKER).count(), 1);
        assert_eq!(once.matches("name=\"viewport\"").count(), 1);
    }

    #[test]
    fn test_viewport_inserted_after_charset() {
        let out = ensure_mobile_optimized_html(PAGE);
        let expected = format!(r#"<meta charset="utf-8">{}"#, viewport_tag());
        assert!(out.contains(&expected));
        assert!(out.contains("<body><header"));
    }

    #[test]
    fn test_viewport_first_in_head_without_charset() {
        let out = ensure_mobile_optimized_html("<html><head><title>x</title></head><body></body></html>");
        assert!(out.starts_with(&format!("<html><head>{}<title>", viewport_tag())));
        assert!(out.contains(&format!("<style>{}</style></head>", MOBILE_BASELINE_CSS)));
    }

    #[test]
    fn test_http_equiv_content_type_is_not_a_charset_tag() {
        let html = r#"<html><head><title>t</title><meta http-equiv="Content-Type" content="text/html; charset=utf-8"></head><body></body></html>"#;
        let out = ensure_mobile_optimized_html(html);
        assert!(out.starts_with(&format!("<html><head>{}<title>", viewport_tag())));

        let unquoted = "<html><head><meta Charset = utf-8><title>t</title></head></html>";
        let out = ensure_mobile_optimized_html(unquoted);
        assert!(out.contains(&format!("<meta Charset = utf-8>{}", viewport_tag())));
    }

    #[test]
    fn test_existing_viewport_is_rewritten() {
        let html = r#"<html><head><meta name="viewport" content="width=980"></head><body></body></html>"#;
        let out = ensure_mobile_optimized_html(html);
        assert!(!out.contains("width=980"));
        assert!(out.contains(MOBILE_VIEWPORT_CONTENT));
    }

    #[test]
    fn test_baseline_prepended_to_existing_style() {
        let html = "<html><head><style>body { color: red; }</style></head><body></body></html>";
        let out = ensure_mobile_optimized_html(html);
        let expected = format!("<style>{}\nbody {{ color: red; }}</style>", MOBILE_BASELINE_CSS);
        assert!(out.contains(&expected));
        assert_eq!(out.matches("<style>").count(), 1);
    }

    #[test]
    fn test_document_without_head_untouched() {
        let fragment = "<div class=\"menu\"><header>Hi</header></div>";
        assert_eq!(ensure_mobile_optimized_html(fragment), fragment);
    }

    #[test]
    fn test_head_without_close_tag() {
        let out = ensure_mobile_optimized_html("<html><head><title>x</title><body>y</body></html>");
        let style_at = out.find("<style>").unwrap();
        assert!(style_at < out.find("<body>").unwrap());
        assert_eq!(ensure_mobile_optimized_html(&out), out);
    }

    #[test]
    fn test_extract_sections_and_named_section() {
        let listing = extract_part(PAGE, &HtmlPart::Sections);
        assert!(listing.starts_with("Found 2 menu sections"));
        assert!(listing.contains("1. Entrantes"));
        assert!(listing.contains("2. Postres"));

        let postres = extract_part(PAGE, &HtmlPart::parse("postres"));
        assert!(postres.contains("Flan"));
        assert!(!postres.contains("Croquetas"));

        let missing = extract_part(PAGE, &HtmlPart::parse("Bebidas"));
        assert!(missing.starts_with("Section 'Bebidas' not found"));
    }

    #[test]
    fn test_extract_header_footer_styles() {
        assert!(extract_part(PAGE, &HtmlPart::Header).contains("<h1>Casa</h1>"));
        assert!(extract_part(PAGE, &HtmlPart::Footer).contains("Gracias"));
        assert_eq!(
            extract_part(PAGE, &HtmlPart::Styles),
            "Styles section not found in menu."
        );
        let hardened = ensure_mobile_optimized_html(PAGE);
        assert!(extract_part(&hardened, &HtmlPart::Styles).contains(MOBILE_BASELINE_MARKER));
    }
}
