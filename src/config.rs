use fancy_regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Settings shared by the recorder, the restoration pass and the sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Every bookkeeping attribute is `{marker_prefix}-...`.
    pub marker_prefix: String,
    /// First segment of generated record ids.
    pub id_prefix: String,
    /// Inner content at or above this many characters is not snapshotted.
    pub content_ceiling: usize,
    pub sweep: SweepConfig,
    /// Delay before the post-restoration visibility re-check.
    pub recheck_delay_ms: i64,
    pub stylesheet_id: String,
    pub stylesheet_href: String,
}

/// Vocabulary the fallback sweeper uses to recognize theme leftovers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Class tokens containing any of these substrings are decorative.
    pub class_keywords: Vec<String>,
    /// Regexes matched against single `name: value` inline declarations.
    pub style_rules: Vec<String>,
    pub wrapper_selectors: Vec<String>,
    /// Host-owned content that must survive wrapper removal.
    pub important_selectors: Vec<String>,
    /// Where rescued content goes, in priority order.
    pub fallback_containers: Vec<String>,
    pub rescue_scope: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            marker_prefix: "data-theme".to_string(),
            id_prefix: "theme".to_string(),
            content_ceiling: 2000,
            sweep: SweepConfig::default(),
            recheck_delay_ms: 50,
            stylesheet_id: "theme-css".to_string(),
            stylesheet_href: "theme.css".to_string(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        let strings =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            class_keywords: strings(&["theme-", "parchment", "castle"]),
            style_rules: strings(&[
                r"(?i)^font-family:.*\b(cinzel|uncialantiqua)\b",
                r"(?i)^background(-image)?:.*\burl\([^)]*theme-assets/",
                r"(?i)^(border-image|filter):.*\bsepia\(",
            ]),
            wrapper_selectors: strings(&[
                ".theme-frame-wrapper",
                ".theme-header-container",
                ".theme-avatar-container",
                ".castle-container",
            ]),
            important_selectors: strings(&[
                ".js-pinned-items-reorder-container",
                "[data-testid=\"pinned-items\"]",
                ".pinned-item-list-item",
            ]),
            fallback_containers: strings(&[
                "main",
                ".application-main",
                "[role=\"main\"]",
                ".container-xl",
                ".container-lg",
                "body",
            ]),
            rescue_scope: ".theme-frame-wrapper, [class*=\"theme-\"]".to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| Error::Config(err.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.marker_prefix.trim().is_empty() {
            return Err(Error::Config("marker_prefix must not be empty".into()));
        }
        if self.marker_prefix.chars().any(|ch| ch.is_whitespace() || ch == '=') {
            return Err(Error::Config(format!(
                "marker_prefix `{}` is not a valid attribute name",
                self.marker_prefix
            )));
        }
        if self.recheck_delay_ms < 0 {
            return Err(Error::Config("recheck_delay_ms must be non-negative".into()));
        }
        self.compile_style_rules().map(|_| ())
    }

    pub(crate) fn compile_style_rules(&self) -> Result<Vec<Regex>> {
        self.sweep
            .style_rules
            .iter()
            .map(|rule| {
                Regex::new(rule)
                    .map_err(|err| Error::Config(format!("invalid style rule `{rule}`: {err}")))
            })
            .collect()
    }

    /// Prefix shared by every bookkeeping attribute, trailing dash included.
    pub fn bookkeeping_prefix(&self) -> String {
        format!("{}-", self.marker_prefix)
    }

    pub fn is_bookkeeping_attr(&self, name: &str) -> bool {
        name.strip_prefix(self.marker_prefix.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }

    pub fn created_attr(&self) -> String {
        self.marker("created")
    }

    pub fn modified_attr(&self) -> String {
        self.marker("modified")
    }

    pub fn id_attr(&self) -> String {
        self.marker("id")
    }

    pub fn placeholder_attr(&self) -> String {
        self.marker("placeholder")
    }

    pub fn icon_attr(&self) -> String {
        self.marker("icon")
    }

    pub fn hidden_attr(&self) -> String {
        self.marker("hidden")
    }

    fn marker(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.marker_prefix)
    }
}
