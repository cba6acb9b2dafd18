use indexmap::IndexMap;
use serde::Serialize;

use crate::Result;
use crate::config::TrackerConfig;
use crate::dom::{Dom, Namespace, NodeId};
use crate::html::{self, SerializeFilter};
use crate::identity::class_string;

/// Inner content as it was at first touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "html", rename_all = "snake_case")]
pub enum ContentSnapshot {
    Captured(String),
    /// Content was at or above the ceiling. Restoration leaves the content
    /// alone.
    Oversized,
}

impl ContentSnapshot {
    pub fn capture(content: String, ceiling: usize) -> Self {
        if content.chars().count() >= ceiling {
            Self::Oversized
        } else {
            Self::Captured(content)
        }
    }

    pub fn as_captured(&self) -> Option<&str> {
        match self {
            Self::Captured(content) => Some(content),
            Self::Oversized => None,
        }
    }
}

/// Pre-theme state of one modified node. Written once, at first touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub class_name: String,
    pub style_text: String,
    pub inner_content: ContentSnapshot,
    /// Attributes minus bookkeeping markers, in document order.
    pub attributes: IndexMap<String, String>,
    pub prior_parent: Option<NodeId>,
    pub prior_next_sibling: Option<NodeId>,
    pub placeholder: Option<NodeId>,
    pub was_moved: bool,
    /// Inline `display` before the theme touched the node.
    pub prior_display: Option<String>,
    pub prior_visibility: Option<String>,
    pub prior_opacity: Option<String>,
    pub hidden_by_theme: bool,
}

/// Caller-supplied "before" values that replace what would be read live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotOverrides {
    pub class_name: Option<String>,
    pub style_text: Option<String>,
    pub inner_content: Option<String>,
    pub prior_parent: Option<NodeId>,
    pub prior_next_sibling: Option<NodeId>,
    pub placeholder: Option<NodeId>,
    pub display: Option<String>,
    pub visibility: Option<String>,
    pub opacity: Option<String>,
}

impl SnapshotOverrides {
    pub fn class_name(mut self, value: impl Into<String>) -> Self {
        self.class_name = Some(value.into());
        self
    }

    pub fn style_text(mut self, value: impl Into<String>) -> Self {
        self.style_text = Some(value.into());
        self
    }

    pub fn inner_content(mut self, value: impl Into<String>) -> Self {
        self.inner_content = Some(value.into());
        self
    }

    pub fn prior_parent(mut self, parent: NodeId) -> Self {
        self.prior_parent = Some(parent);
        self
    }

    pub fn prior_next_sibling(mut self, sibling: NodeId) -> Self {
        self.prior_next_sibling = Some(sibling);
        self
    }

    pub fn placeholder(mut self, placeholder: NodeId) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn display(mut self, value: impl Into<String>) -> Self {
        self.display = Some(value.into());
        self
    }

    pub fn visibility(mut self, value: impl Into<String>) -> Self {
        self.visibility = Some(value.into());
        self
    }

    pub fn opacity(mut self, value: impl Into<String>) -> Self {
        self.opacity = Some(value.into());
        self
    }
}

impl Snapshot {
    /// Reads the node's live state, letting `overrides` win field by field.
    pub(crate) fn capture(
        dom: &Dom,
        node: NodeId,
        overrides: SnapshotOverrides,
        config: &TrackerConfig,
    ) -> Result<Self> {
        let inner_content = match overrides.inner_content {
            Some(content) => content,
            None => pre_theme_content(dom, node, config)?,
        };

        let attributes = dom
            .attributes(node)
            .into_iter()
            .filter(|(name, _)| !config.is_bookkeeping_attr(name))
            .collect();

        Ok(Self {
            class_name: overrides
                .class_name
                .unwrap_or_else(|| class_string(dom, node)),
            style_text: overrides
                .style_text
                .unwrap_or_else(|| dom.style_text(node)),
            inner_content: ContentSnapshot::capture(inner_content, config.content_ceiling),
            attributes,
            prior_parent: overrides.prior_parent.or_else(|| dom.parent(node)),
            prior_next_sibling: overrides
                .prior_next_sibling
                .or_else(|| dom.next_sibling(node)),
            placeholder: overrides.placeholder,
            was_moved: false,
            prior_display: overrides
                .display
                .or_else(|| dom.style_get(node, "display")),
            prior_visibility: overrides
                .visibility
                .or_else(|| dom.style_get(node, "visibility")),
            prior_opacity: overrides
                .opacity
                .or_else(|| dom.style_get(node, "opacity")),
            hidden_by_theme: false,
        })
    }

    pub(crate) fn had_class_attr(&self) -> bool {
        self.attributes.contains_key("class")
    }
}

/// Inner HTML as the host would have it: bookkeeping attributes are left
/// out, and so are theme-created elements and placeholders with their
/// subtrees.
pub(crate) fn pre_theme_content(dom: &Dom, node: NodeId, config: &TrackerConfig) -> Result<String> {
    serialize_pre_theme(dom, node, config, false)
}

/// Whether the node's pre-theme content equals `content`, ignoring the order
/// attributes were written in. Restoring an attribute appends it, so a
/// descendant put back before its ancestor may serialize differently while
/// holding the same state.
pub(crate) fn content_matches(
    dom: &Dom,
    node: NodeId,
    content: &str,
    config: &TrackerConfig,
) -> Result<bool> {
    if serialize_pre_theme(dom, node, config, false)? == content {
        return Ok(true);
    }
    let namespace = dom.namespace(node).unwrap_or(Namespace::Html);
    let recorded = html::parse_fragment(content, namespace)?;
    let recorded = serialize_pre_theme(&recorded, recorded.root(), config, true)?;
    Ok(serialize_pre_theme(dom, node, config, true)? == recorded)
}

fn serialize_pre_theme(
    dom: &Dom,
    node: NodeId,
    config: &TrackerConfig,
    sort_attrs: bool,
) -> Result<String> {
    let created = config.created_attr();
    let placeholder = config.placeholder_attr();
    let skip_attr = |name: &str| config.is_bookkeeping_attr(name);
    let skip_element =
        |element: NodeId| dom.has_attr(element, &created) || dom.has_attr(element, &placeholder);
    dom.inner_html_filtered(
        node,
        &SerializeFilter {
            skip_attr: &skip_attr,
            skip_element: &skip_element,
            sort_attrs,
        },
    )
}
