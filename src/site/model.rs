//! The canonical site document.
//!
//! `SiteState` is the one mutable description of the site being edited. It is
//! loaded once per pipeline run, mutated by appliers and the builder, and
//! persisted once at the end of a successful run. Every section is
//! `#[serde(default)]` so partial or older documents load into a valid value.

use crate::core::error::PostEditError;
use crate::core::migration::{self, SITE_STATE_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub type TokenMap = BTreeMap<String, String>;
pub type JsonMap = BTreeMap<String, JsonValue>;

pub const DEFAULT_FRAMEWORK: &str = "bootstrap";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteBlock {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub meta: JsonMap,
}

impl Default for SiteBlock {
    fn default() -> Self {
        Self {
            id: String::new(),
            text: String::new(),
            kind: "text".to_string(),
            meta: JsonMap::new(),
        }
    }
}

impl SiteBlock {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(JsonValue::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitePage {
    pub path: String,
    pub url: String,
    pub title: String,
    pub blocks: Vec<SiteBlock>,
    pub seo: JsonMap,
    pub content_hash: Option<String>,
    /// HTML from the last time this page was rendered
    pub rendered: Option<String>,
}

impl SitePage {
    pub fn new(path: impl Into<String>, title: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            url: path.clone(),
            path,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_block(mut self, block: SiteBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Key used by change operations to address this page.
    pub fn key(&self) -> &str {
        if self.path.is_empty() { &self.url } else { &self.path }
    }

    pub fn find_block_mut(&mut self, id: &str) -> Option<&mut SiteBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavItem {
    pub label: String,
    pub href: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavItem>,
}

impl NavItem {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavLayout {
    pub location: Option<String>,
    pub dropdown: Option<String>,
    /// Dropdown state on page load (`open` or `closed`)
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nav {
    pub items: Vec<NavItem>,
    pub layout: NavLayout,
    /// Pre-rendered navigation markup; empty means "render from items"
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadLink {
    pub rel: String,
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Head {
    pub title: String,
    pub brand: Option<String>,
    pub meta: JsonMap,
    pub links: Vec<HeadLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeTokens {
    pub palette: TokenMap,
    pub shape: TokenMap,
    pub shadow: TokenMap,
    pub spacing: TokenMap,
    pub typography: TokenMap,
}

impl ThemeTokens {
    pub fn group_mut(&mut self, name: &str) -> Option<&mut TokenMap> {
        match name {
            "palette" => Some(&mut self.palette),
            "shape" => Some(&mut self.shape),
            "shadow" => Some(&mut self.shadow),
            "spacing" => Some(&mut self.spacing),
            "typography" => Some(&mut self.typography),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
            && self.shape.is_empty()
            && self.shadow.is_empty()
            && self.spacing.is_empty()
            && self.typography.is_empty()
    }
}

fn tokens(pairs: &[(&str, &str)]) -> TokenMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub tokens: ThemeTokens,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            tokens: ThemeTokens {
                palette: tokens(&[("primary", "#0d6efd"), ("background", "#ffffff")]),
                shape: tokens(&[("radius", "0.5rem")]),
                shadow: tokens(&[("medium", "0 4px 12px rgba(0,0,0,0.1)")]),
                spacing: TokenMap::new(),
                typography: TokenMap::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CssBundle {
    /// Stylesheet text written to `assets/css/main.css`
    pub raw: String,
    /// Tokens the raw stylesheet was generated from
    pub tokens: ThemeTokens,
    pub framework: String,
}

impl Default for CssBundle {
    fn default() -> Self {
        Self {
            raw: String::new(),
            tokens: ThemeTokens::default(),
            framework: DEFAULT_FRAMEWORK.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Assets {
    pub images: Vec<JsonValue>,
    pub logo: JsonMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSeo {
    pub description: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seo {
    /// Per-page metadata keyed by page key
    pub meta: BTreeMap<String, PageSeo>,
    pub ld_json: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildHistoryEntry {
    pub dir: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildInfo {
    pub latest_dist: Option<String>,
    pub history: Vec<BuildHistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteState {
    pub schema_version: u32,
    pub nav: Nav,
    pub head: Head,
    pub pages: Vec<SitePage>,
    pub theme: Theme,
    pub css_bundle: CssBundle,
    pub assets: Assets,
    pub seo: Seo,
    pub build: BuildInfo,
}

impl Default for SiteState {
    fn default() -> Self {
        Self {
            schema_version: SITE_STATE_SCHEMA_VERSION,
            nav: Nav::default(),
            head: Head::default(),
            pages: Vec::new(),
            theme: Theme::default(),
            css_bundle: CssBundle::default(),
            assets: Assets::default(),
            seo: Seo::default(),
            build: BuildInfo::default(),
        }
    }
}

impl SiteState {
    pub fn to_value(&self) -> Result<JsonValue, PostEditError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a document from its plain JSON form, migrating older schema
    /// versions first. `null` yields the default document.
    pub fn from_value(value: JsonValue) -> Result<Self, PostEditError> {
        let migrated = migration::migrate_site_state(value)?;
        if migrated.is_null() {
            return Ok(Self::default());
        }
        let mut state: SiteState = serde_json::from_value(migrated)?;
        state.ensure_defaults();
        Ok(state)
    }

    /// Re-establish invariants on a hand-built document. Idempotent.
    pub fn ensure_defaults(&mut self) {
        self.schema_version = SITE_STATE_SCHEMA_VERSION;
        if self.css_bundle.framework.trim().is_empty() {
            self.css_bundle.framework = DEFAULT_FRAMEWORK.to_string();
        }
    }

    /// The page whose `path` or `url` equals `key`.
    pub fn find_page(&self, key: &str) -> Option<&SitePage> {
        self.pages.iter().find(|p| p.path == key || p.url == key)
    }

    pub fn find_page_mut(&mut self, key: &str) -> Option<&mut SitePage> {
        self.pages.iter_mut().find(|p| p.path == key || p.url == key)
    }

    /// The existing page for `path`, or a new one appended to `pages`.
    /// Never creates a second page for a path that is already present.
    pub fn ensure_page(
        &mut self,
        path: &str,
        url: Option<&str>,
        title: Option<&str>,
    ) -> &mut SitePage {
        let idx = match self
            .pages
            .iter()
            .position(|p| p.path == path || p.url == path)
        {
            Some(idx) => idx,
            None => {
                self.pages.push(SitePage {
                    path: path.to_string(),
                    url: url.unwrap_or(path).to_string(),
                    title: title.unwrap_or(path).to_string(),
                    ..SitePage::default()
                });
                self.pages.len() - 1
            }
        };
        &mut self.pages[idx]
    }

    pub fn block_count(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }

    pub fn page_keys(&self) -> Vec<String> {
        self.pages.iter().map(|p| p.key().to_string()).collect()
    }
}
