//! Static HTML and CSS rendering for built pages.
//!
//! Rendering is a pure function of the [`SiteState`]: the same document
//! always produces the same bytes, which is what lets the builder compare
//! and reuse files across builds.

use crate::site::model::{Nav, NavItem, SiteBlock, SitePage, SiteState, ThemeTokens};
use serde_json::Value as JsonValue;
use std::fmt::Write;

pub const STYLESHEET_PATH: &str = "assets/css/main.css";
pub const DEFAULT_BUTTON_SHADOW: &str = "0 4px 12px rgba(0,0,0,0.1)";
pub const DEFAULT_CTA_TEXT: &str = "Get in touch today.";

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Output file for a page, relative to the build directory.
///
/// `/` → `index.html`, `/services` → `services.html`, paths already ending
/// in `.html` are kept as-is.
pub fn page_filename(page: &SitePage) -> String {
    let raw = if !page.path.is_empty() {
        page.path.as_str()
    } else if !page.url.is_empty() {
        page.url.as_str()
    } else {
        "index"
    };

    if raw.ends_with(".html") {
        return raw.trim_start_matches('/').to_string();
    }
    let slug = raw.trim_matches('/');
    if slug.is_empty() || slug == "index" {
        "index.html".to_string()
    } else {
        format!("{}.html", slug)
    }
}

/// `../` repeated once per directory level of `filename`.
fn asset_prefix(filename: &str) -> String {
    "../".repeat(filename.matches('/').count())
}

pub fn render_nav(nav: &Nav) -> String {
    let mut classes = vec!["nav".to_string()];
    if let Some(location) = &nav.layout.location {
        classes.push(format!("nav-{}", location));
    }
    if let Some(mode) = &nav.layout.dropdown {
        classes.push(format!("dropdown-{}", mode));
    }
    if let Some(state) = &nav.layout.default {
        classes.push(format!("dropdown-{}", state));
    }

    let mut html = format!("<nav class=\"{}\">", escape_html(&classes.join(" ")));
    render_nav_items(&mut html, &nav.items);
    html.push_str("</nav>");
    html
}

fn render_nav_items(out: &mut String, items: &[NavItem]) {
    out.push_str("<ul>");
    for item in items {
        let href = if item.href.is_empty() { "#" } else { &item.href };
        let _ = write!(
            out,
            "<li><a href=\"{}\">{}</a>",
            escape_html(href),
            escape_html(&item.label)
        );
        if !item.children.is_empty() {
            render_nav_items(out, &item.children);
        }
        out.push_str("</li>");
    }
    out.push_str("</ul>");
}

fn block_heading(block: &SiteBlock) -> String {
    if let Some(heading) = block.meta_str("heading") {
        return heading.to_string();
    }
    block
        .id
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_block(block: &SiteBlock) -> String {
    let cta = match block.meta.get("call_to_action") {
        Some(JsonValue::String(text)) if !text.is_empty() => Some(text.as_str()),
        Some(JsonValue::Bool(true)) => Some(DEFAULT_CTA_TEXT),
        _ => None,
    };

    let mut html = format!(
        "    <section id=\"{}\" class=\"block-{}\">\n      <h2>{}</h2>\n      <p>{}</p>\n",
        escape_html(&block.id),
        escape_html(&block.kind),
        escape_html(&block_heading(block)),
        escape_html(&block.text),
    );
    if let Some(text) = cta {
        let _ = writeln!(html, "      <p class=\"call-to-action\">{}</p>", escape_html(text));
    }
    html.push_str("    </section>");
    html
}

fn meta_content(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn render_page(state: &SiteState, page: &SitePage) -> String {
    let filename = page_filename(page);
    let prefix = asset_prefix(&filename);

    let nav_html = if state.nav.html.trim().is_empty() {
        render_nav(&state.nav)
    } else {
        state.nav.html.clone()
    };

    let title = [state.head.title.as_str(), page.title.as_str()]
        .into_iter()
        .find(|t| !t.trim().is_empty())
        .unwrap_or("Updated Page");

    let mut head = String::new();
    let _ = writeln!(head, "  <meta charset=\"utf-8\"/>");
    let _ = writeln!(head, "  <title>{}</title>", escape_html(title));

    if let Some(seo) = state.seo.meta.get(page.key()) {
        let _ = writeln!(
            head,
            "  <meta name=\"description\" content=\"{}\"/>",
            escape_html(&seo.description)
        );
        if !seo.keywords.is_empty() {
            let _ = writeln!(
                head,
                "  <meta name=\"keywords\" content=\"{}\"/>",
                escape_html(&seo.keywords.join(", "))
            );
        }
    }
    for (name, value) in &state.head.meta {
        if let Some(content) = meta_content(value) {
            let _ = writeln!(
                head,
                "  <meta name=\"{}\" content=\"{}\"/>",
                escape_html(name),
                escape_html(&content)
            );
        }
    }
    let _ = writeln!(
        head,
        "  <link rel=\"stylesheet\" href=\"{}{}\"/>",
        prefix, STYLESHEET_PATH
    );
    for link in &state.head.links {
        let _ = writeln!(
            head,
            "  <link rel=\"{}\" href=\"{}\"/>",
            escape_html(&link.rel),
            escape_html(&link.href)
        );
    }

    let blocks = page
        .blocks
        .iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n{head}</head>\n<body>\n  <header>{nav_html}</header>\n  <main>\n{blocks}\n  </main>\n  <footer class=\"site-footer\">Generated by postedit</footer>\n</body>\n</html>\n"
    )
}

/// Stylesheet derived from theme tokens alone.
pub fn css_from_tokens(tokens: &ThemeTokens) -> String {
    let mut css = String::from(":root {\n");
    for (key, value) in &tokens.palette {
        let _ = writeln!(css, "  --color-{}: {};", key, value);
    }
    if let Some(radius) = tokens.shape.get("radius") {
        let _ = writeln!(css, "  --radius-base: {};", radius);
    }
    for (key, value) in &tokens.shadow {
        let _ = writeln!(css, "  --shadow-{}: {};", key, value);
    }
    for (key, value) in &tokens.spacing {
        let _ = writeln!(css, "  --space-{}: {};", key, value);
    }
    for (key, value) in &tokens.typography {
        let _ = writeln!(css, "  --font-{}: {};", key, value);
    }
    css.push_str("}\n\n");

    let button_shadow = tokens
        .shadow
        .get("button")
        .map(String::as_str)
        .unwrap_or(DEFAULT_BUTTON_SHADOW);
    let _ = writeln!(
        css,
        "body {{ background: var(--color-background, #ffffff); }}\n\n\
         .btn-primary {{ background: var(--color-primary, #0d6efd); color: #fff; \
         border-radius: var(--radius-base, 0.5rem); box-shadow: {}; padding: 0.75rem 1.5rem; }}\n\n\
         .call-to-action {{ color: var(--color-accent, var(--color-primary, #0d6efd)); font-weight: 600; }}\n\n\
         nav ul {{ display: flex; gap: 1rem; list-style: none; padding: 0; margin: 0; }}",
        button_shadow
    );
    css
}

/// The css applier's stylesheet: an intent comment, token CSS, then any
/// extra rules.
pub fn css_bundle_text(hints: &str, tokens: &ThemeTokens, extra: Option<&str>) -> String {
    let hints = hints.replace("*/", "* /");
    let mut css = format!("/* style intent: {} */\n", hints.trim());
    css.push_str(&css_from_tokens(tokens));
    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        css.push('\n');
        css.push_str(extra);
        css.push('\n');
    }
    css
}
