use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::html::{self, SerializeFilter};
use crate::selector::{self, SelectorPart};
use crate::{Error, Result};

const RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

/// Handle to a node in a [`Dom`] arena.
///
/// Nodes are never freed, so a `NodeId` can always be dereferenced. Holding
/// one says nothing about whether the node is still part of the document;
/// check [`Dom::is_connected`] before relying on its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Html,
    Svg,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    node_type: NodeType,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    pub(crate) namespace: Namespace,
    pub(crate) attrs: IndexMap<String, String>,
}

impl Element {
    pub(crate) fn new(
        tag_name: String,
        namespace: Namespace,
        attrs: IndexMap<String, String>,
    ) -> Self {
        Self {
            tag_name,
            namespace,
            attrs,
        }
    }
}

/// The class of a node as the platform exposes it.
///
/// HTML elements expose a plain string, SVG elements an animated string
/// whose base value holds the class list, and non-element nodes have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassValue<'a> {
    Plain(&'a str),
    Animated { base_val: &'a str },
    Unsupported,
}

impl<'a> ClassValue<'a> {
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Animated { base_val } => Some(base_val),
            Self::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    ChildList {
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    Attribute {
        name: String,
    },
    CharacterData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

/// A live document tree.
///
/// Both the host page and the theme mutate the same `Dom`; nothing here
/// knows which side a change came from.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
    root: NodeId,
    id_index: HashMap<String, NodeId>,
    locked_attrs: HashSet<(NodeId, String)>,
    observing: bool,
    mutation_records: Vec<MutationRecord>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            id_index: HashMap::new(),
            locked_attrs: HashSet::new(),
            observing: false,
            mutation_records: Vec::new(),
        }
    }

    pub fn from_html(html: &str) -> Result<Self> {
        let mut dom = html::parse_fragment(html, Namespace::Html)?;
        dom.rebuild_id_index();
        Ok(dom)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    pub(crate) fn node_type(&self, node_id: NodeId) -> &NodeType {
        &self.nodes[node_id.0].node_type
    }

    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        let tag_name = tag_name.to_ascii_lowercase();
        let namespace = if tag_name == "svg" {
            Namespace::Svg
        } else {
            Namespace::Html
        };
        self.create_element_ns(&tag_name, namespace)
    }

    pub fn create_element_ns(&mut self, tag_name: &str, namespace: Namespace) -> NodeId {
        let element = Element::new(tag_name.to_ascii_lowercase(), namespace, IndexMap::new());
        self.create_node(None, NodeType::Element(element))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.create_node(None, NodeType::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.create_node(None, NodeType::Comment(text.to_string()))
    }

    fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes.get(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_or_err(&self, node_id: NodeId, op: &str) -> Result<&Element> {
        self.element(node_id)
            .ok_or_else(|| Error::Dom(format!("{op} target is not an element")))
    }

    fn element_mut_or_err(&mut self, node_id: NodeId, op: &str) -> Result<&mut Element> {
        self.element_mut(node_id)
            .ok_or_else(|| Error::Dom(format!("{op} target is not an element")))
    }

    pub fn is_element(&self, node_id: NodeId) -> bool {
        self.element(node_id).is_some()
    }

    pub fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    pub fn namespace(&self, node_id: NodeId) -> Option<Namespace> {
        self.element(node_id).map(|e| e.namespace)
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes.get(node_id.0)?.parent
    }

    pub fn children(&self, node_id: NodeId) -> &[NodeId] {
        self.nodes
            .get(node_id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn element_children(&self, node_id: NodeId) -> Vec<NodeId> {
        self.children(node_id)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
            .collect()
    }

    pub fn next_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        let children = &self.nodes[parent.0].children;
        let pos = children.iter().position(|id| *id == node_id)?;
        children.get(pos + 1).copied()
    }

    pub fn previous_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        let children = &self.nodes[parent.0].children;
        let pos = children.iter().position(|id| *id == node_id)?;
        pos.checked_sub(1).map(|prev| children[prev])
    }

    /// Number of ancestors between the node and the top of its tree.
    pub fn depth(&self, node_id: NodeId) -> usize {
        let mut depth = 0usize;
        let mut cursor = self.parent(node_id);
        while let Some(current) = cursor {
            depth += 1;
            cursor = self.parent(current);
        }
        depth
    }

    pub fn is_descendant_of(&self, node_id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(node_id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Inclusive containment, like `Node.contains`.
    pub fn contains(&self, ancestor: NodeId, node_id: NodeId) -> bool {
        ancestor == node_id || self.is_descendant_of(node_id, ancestor)
    }

    pub fn is_connected(&self, node_id: NodeId) -> bool {
        if !self.is_valid_node(node_id) {
            return false;
        }
        node_id == self.root || self.is_descendant_of(node_id, self.root)
    }

    pub fn is_valid_node(&self, node_id: NodeId) -> bool {
        node_id.0 < self.nodes.len()
    }

    fn can_have_children(&self, node_id: NodeId) -> bool {
        matches!(
            self.nodes.get(node_id.0).map(|n| &n.node_type),
            Some(NodeType::Document | NodeType::Element(_))
        )
    }

    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    pub fn body(&self) -> Option<NodeId> {
        self.find_first_by_tag("body")
    }

    pub fn head(&self) -> Option<NodeId> {
        self.find_first_by_tag("head")
    }

    fn find_first_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.all_elements()
            .into_iter()
            .find(|node| self.tag_name(*node) == Some(tag))
    }

    pub fn attr(&self, node_id: NodeId, name: &str) -> Option<&str> {
        self.element(node_id)
            .and_then(|e| e.attrs.get(&name.to_ascii_lowercase()))
            .map(String::as_str)
    }

    pub fn has_attr(&self, node_id: NodeId, name: &str) -> bool {
        self.attr(node_id, name).is_some()
    }

    pub fn attributes(&self, node_id: NodeId) -> Vec<(String, String)> {
        self.element(node_id)
            .map(|e| {
                e.attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Makes later writes to `name` on this node fail, the way some host
    /// frameworks freeze attributes they manage.
    pub fn lock_attribute(&mut self, node_id: NodeId, name: &str) {
        self.locked_attrs
            .insert((node_id, name.to_ascii_lowercase()));
    }

    pub fn unlock_attribute(&mut self, node_id: NodeId, name: &str) {
        self.locked_attrs
            .remove(&(node_id, name.to_ascii_lowercase()));
    }

    fn ensure_writable(&self, node_id: NodeId, lowered: &str) -> Result<()> {
        if self.locked_attrs.contains(&(node_id, lowered.to_string())) {
            return Err(Error::Dom(format!("attribute `{lowered}` is read-only")));
        }
        Ok(())
    }

    pub fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        if lowered.is_empty() || lowered.chars().any(|ch| ch.is_whitespace() || ch == '=') {
            return Err(Error::Dom(format!("invalid attribute name `{name}`")));
        }
        self.ensure_writable(node_id, &lowered)?;
        let element = self.element_mut_or_err(node_id, "setAttribute")?;
        element.attrs.insert(lowered.clone(), value.to_string());

        if lowered == "id" {
            self.rebuild_id_index();
        }
        self.record(node_id, MutationKind::Attribute { name: lowered });
        Ok(())
    }

    pub fn remove_attr(&mut self, node_id: NodeId, name: &str) -> Result<()> {
        let lowered = name.to_ascii_lowercase();
        self.ensure_writable(node_id, &lowered)?;
        let element = self.element_mut_or_err(node_id, "removeAttribute")?;
        if element.attrs.shift_remove(&lowered).is_none() {
            return Ok(());
        }

        if lowered == "id" {
            self.rebuild_id_index();
        }
        self.record(node_id, MutationKind::Attribute { name: lowered });
        Ok(())
    }

    /// Moves the named attributes to the front, in the given order. Names the
    /// element lacks are ignored. Values are untouched, so nothing is queued
    /// for observers.
    pub fn reorder_attributes<'n>(
        &mut self,
        node_id: NodeId,
        order: impl IntoIterator<Item = &'n str>,
    ) -> Result<()> {
        let element = self.element_mut_or_err(node_id, "reorderAttributes")?;
        let mut rest = std::mem::take(&mut element.attrs);
        let mut ordered = IndexMap::with_capacity(rest.len());
        for name in order {
            if let Some((name, value)) = rest.shift_remove_entry(name) {
                ordered.insert(name, value);
            }
        }
        ordered.extend(rest);
        element.attrs = ordered;
        Ok(())
    }

    pub fn class_value(&self, node_id: NodeId) -> ClassValue<'_> {
        let Some(element) = self.element(node_id) else {
            return ClassValue::Unsupported;
        };
        let value = element.attrs.get("class").map(String::as_str).unwrap_or("");
        match element.namespace {
            Namespace::Html => ClassValue::Plain(value),
            Namespace::Svg => ClassValue::Animated { base_val: value },
        }
    }

    /// Writes the class attribute directly, which works for both HTML and
    /// SVG elements.
    pub fn set_class_name(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        self.set_attr(node_id, "class", value)
    }

    pub fn class_tokens(&self, node_id: NodeId) -> Vec<String> {
        class_tokens(self.class_value(node_id).as_str())
    }

    pub fn class_contains(&self, node_id: NodeId, class_name: &str) -> bool {
        self.class_value(node_id)
            .as_str()
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class_name))
    }

    pub fn class_add(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        self.element_or_err(node_id, "classList")?;
        let mut classes = self.class_tokens(node_id);
        if classes.iter().any(|name| name == class_name) {
            return Ok(());
        }
        classes.push(class_name.to_string());
        self.set_attr(node_id, "class", &classes.join(" "))
    }

    pub fn class_remove(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        self.element_or_err(node_id, "classList")?;
        let mut classes = self.class_tokens(node_id);
        let before = classes.len();
        classes.retain(|name| name != class_name);
        if classes.len() == before {
            return Ok(());
        }
        self.set_attr(node_id, "class", &classes.join(" "))
    }

    pub fn style_text(&self, node_id: NodeId) -> String {
        self.attr(node_id, "style").unwrap_or_default().to_string()
    }

    /// Replaces the inline style, keeping the text as written. Blank text
    /// removes the attribute.
    pub fn set_style_text(&mut self, node_id: NodeId, css_text: &str) -> Result<()> {
        if css_text.trim().is_empty() {
            self.element_or_err(node_id, "style")?;
            return self.remove_attr(node_id, "style");
        }
        self.set_attr(node_id, "style", css_text)
    }

    pub fn style_get(&self, node_id: NodeId, property: &str) -> Option<String> {
        let name = property.to_ascii_lowercase();
        parse_style_declarations(self.attr(node_id, "style"))
            .into_iter()
            .find(|(prop, _)| prop == &name)
            .map(|(_, value)| value)
    }

    pub fn style_set(&mut self, node_id: NodeId, property: &str, value: &str) -> Result<()> {
        let name = property.to_ascii_lowercase();
        let mut decls = parse_style_declarations(
            self.element_or_err(node_id, "style")?
                .attrs
                .get("style")
                .map(String::as_str),
        );
        if let Some(pos) = decls.iter().position(|(prop, _)| prop == &name) {
            if value.is_empty() {
                decls.remove(pos);
            } else {
                decls[pos].1 = value.to_string();
            }
        } else if !value.is_empty() {
            decls.push((name, value.to_string()));
        }
        self.set_style_text(node_id, &serialize_style_declarations(&decls))
    }

    pub fn style_remove(&mut self, node_id: NodeId, property: &str) -> Result<()> {
        self.style_set(node_id, property, "")
    }

    pub fn text_content(&self, node_id: NodeId) -> String {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document | NodeType::Element(_) => {
                let mut out = String::new();
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.text_content(*child));
                }
                out
            }
            NodeType::Text(text) => text.clone(),
            NodeType::Comment(_) => String::new(),
        }
    }

    pub fn set_text_content(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        match &mut self.nodes[node_id.0].node_type {
            NodeType::Text(text) | NodeType::Comment(text) => {
                *text = value.to_string();
                self.record(node_id, MutationKind::CharacterData);
                return Ok(());
            }
            NodeType::Document => {
                return Err(Error::Dom("textContent target is the document".into()));
            }
            NodeType::Element(_) => {}
        }

        let removed = self.detach_all_children(node_id);
        let mut added = Vec::new();
        if !value.is_empty() {
            added.push(self.create_node(Some(node_id), NodeType::Text(value.to_string())));
        }
        self.rebuild_id_index();
        self.record(node_id, MutationKind::ChildList { added, removed });
        Ok(())
    }

    pub fn inner_html(&self, node_id: NodeId) -> Result<String> {
        self.element_or_err(node_id, "innerHTML")?;
        let mut out = String::new();
        html::serialize_children(self, node_id, &mut out);
        Ok(out)
    }

    /// Inner HTML with every attribute starting with `attr_prefix` left out.
    pub fn inner_html_excluding(&self, node_id: NodeId, attr_prefix: &str) -> Result<String> {
        let skip_attr = |name: &str| name.starts_with(attr_prefix);
        let skip_element = |_: NodeId| false;
        self.inner_html_filtered(
            node_id,
            &SerializeFilter {
                skip_attr: &skip_attr,
                skip_element: &skip_element,
                sort_attrs: false,
            },
        )
    }

    pub(crate) fn inner_html_filtered(
        &self,
        node_id: NodeId,
        filter: &SerializeFilter<'_>,
    ) -> Result<String> {
        if !self.can_have_children(node_id) {
            return Err(Error::Dom("innerHTML target cannot have children".into()));
        }
        let mut out = String::new();
        html::serialize_children_filtered(self, node_id, filter, &mut out);
        Ok(out)
    }

    pub fn outer_html(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        html::serialize_node(self, node_id, false, &mut out);
        out
    }

    /// Serializes the whole document.
    pub fn dump(&self) -> String {
        self.outer_html(self.root)
    }

    /// Replaces the node's children with the parsed fragment. The previous
    /// children are detached, not destroyed: anything still holding their ids
    /// sees them as disconnected.
    pub fn set_inner_html(&mut self, node_id: NodeId, markup: &str) -> Result<()> {
        let namespace = self.element_or_err(node_id, "innerHTML")?.namespace;
        let fragment = html::parse_fragment(markup, namespace)?;

        let removed = self.detach_all_children(node_id);
        let mut added = Vec::new();
        for child in fragment.children(fragment.root()).to_vec() {
            added.push(self.clone_subtree_from_dom(&fragment, child, Some(node_id))?);
        }

        self.rebuild_id_index();
        self.record(node_id, MutationKind::ChildList { added, removed });
        Ok(())
    }

    fn detach_all_children(&mut self, node_id: NodeId) -> Vec<NodeId> {
        let old_children = std::mem::take(&mut self.nodes[node_id.0].children);
        for child in &old_children {
            self.nodes[child.0].parent = None;
        }
        old_children
    }

    fn clone_subtree_from_dom(
        &mut self,
        source: &Dom,
        source_node: NodeId,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || {
            let node_type = match &source.nodes[source_node.0].node_type {
                NodeType::Document => {
                    return Err(Error::Dom("cannot clone a document node".into()));
                }
                other => other.clone(),
            };

            let node = self.create_node(parent, node_type);
            for child in &source.nodes[source_node.0].children {
                self.clone_subtree_from_dom(source, *child, Some(node))?;
            }
            Ok(node)
        })
    }

    pub fn clone_node(&mut self, node_id: NodeId, deep: bool) -> Result<NodeId> {
        if node_id == self.root {
            return Err(Error::Dom("cannot clone the document".into()));
        }
        let copy = self.create_node(None, self.nodes[node_id.0].node_type.clone());
        if deep {
            let snapshot = self.clone();
            for child in snapshot.children(node_id) {
                self.clone_subtree_from_dom(&snapshot, *child, Some(copy))?;
            }
        }
        Ok(copy)
    }

    fn validate_insertion(&self, parent: NodeId, child: NodeId, op: &str) -> Result<()> {
        if !self.can_have_children(parent) {
            return Err(Error::Dom(format!("{op} target cannot have children")));
        }
        if child == self.root || child == parent || !self.is_valid_node(child) {
            return Err(Error::Dom(format!("invalid {op} node")));
        }
        // The parent must not be inside the child's subtree.
        if self.is_descendant_of(parent, child) {
            return Err(Error::Dom(format!("{op} would create a cycle")));
        }
        Ok(())
    }

    fn unlink(&mut self, child: NodeId) -> Option<NodeId> {
        let old_parent = self.parent(child)?;
        self.nodes[old_parent.0].children.retain(|id| *id != child);
        self.nodes[child.0].parent = None;
        Some(old_parent)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.validate_insertion(parent, child, "appendChild")?;
        if let Some(old_parent) = self.unlink(child) {
            self.record_removed(old_parent, child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.rebuild_id_index();
        self.record_added(parent, child);
        Ok(())
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        match self.children(parent).first().copied() {
            Some(reference) if reference != child => self.insert_before(parent, child, reference),
            Some(_) => Ok(()),
            None => self.append_child(parent, child),
        }
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<()> {
        self.validate_insertion(parent, child, "insertBefore")?;
        if !self.is_valid_node(reference) {
            return Err(Error::Dom("insertBefore reference is invalid".into()));
        }
        if self.parent(reference) != Some(parent) {
            return Err(Error::Dom(
                "insertBefore reference is not a direct child".into(),
            ));
        }
        if child == reference {
            return Ok(());
        }

        if let Some(old_parent) = self.unlink(child) {
            self.record_removed(old_parent, child);
        }

        let Some(index) = self.nodes[parent.0]
            .children
            .iter()
            .position(|id| *id == reference)
        else {
            return Err(Error::Dom("insertBefore reference is missing".into()));
        };

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
        self.rebuild_id_index();
        self.record_added(parent, child);
        Ok(())
    }

    pub fn insert_after(&mut self, target: NodeId, child: NodeId) -> Result<()> {
        let Some(parent) = self.parent(target) else {
            return Err(Error::Dom("insertAfter target is detached".into()));
        };
        match self.next_sibling(target) {
            Some(next) if next == child => Ok(()),
            Some(next) => self.insert_before(parent, child, next),
            None => self.append_child(parent, child),
        }
    }

    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
    ) -> Result<()> {
        if new_child == old_child {
            return Ok(());
        }
        self.insert_before(parent, new_child, old_child)?;
        self.remove_child(parent, old_child)
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.parent(child) != Some(parent) {
            return Err(Error::Dom("removeChild target is not a direct child".into()));
        }
        self.unlink(child);
        self.rebuild_id_index();
        self.record_removed(parent, child);
        Ok(())
    }

    /// Detaches the node from its parent. Detached nodes are left alone.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        if node == self.root {
            return Err(Error::Dom("cannot remove the document root".into()));
        }
        let Some(parent) = self.parent(node) else {
            return Ok(());
        };
        self.remove_child(parent, node)
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let groups = selector::parse_selector_groups(selector)?;
        Ok(self.match_all(self.all_elements(), &groups))
    }

    pub fn query_selector_all_from(&self, root: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let groups = selector::parse_selector_groups(selector)?;
        let mut ids = Vec::new();
        for child in self.children(root) {
            self.collect_elements_dfs(*child, &mut ids);
        }
        Ok(self.match_all(ids, &groups))
    }

    fn match_all(&self, candidates: Vec<NodeId>, groups: &[Vec<SelectorPart>]) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|candidate| {
                groups
                    .iter()
                    .any(|steps| selector::matches_chain(self, *candidate, steps))
                    && seen.insert(*candidate)
            })
            .collect()
    }

    pub fn matches_selector(&self, node_id: NodeId, selector: &str) -> Result<bool> {
        if !self.is_element(node_id) {
            return Ok(false);
        }
        let groups = selector::parse_selector_groups(selector)?;
        Ok(groups
            .iter()
            .any(|steps| selector::matches_chain(self, node_id, steps)))
    }

    pub fn closest(&self, node_id: NodeId, selector: &str) -> Result<Option<NodeId>> {
        if !self.is_element(node_id) {
            return Ok(None);
        }
        let groups = selector::parse_selector_groups(selector)?;
        let mut cursor = Some(node_id);
        while let Some(current) = cursor {
            if groups
                .iter()
                .any(|steps| selector::matches_chain(self, current, steps))
            {
                return Ok(Some(current));
            }
            cursor = self.parent(current);
        }
        Ok(None)
    }

    pub fn all_elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements_dfs(self.root, &mut out);
        out
    }

    fn collect_elements_dfs(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        let mut stack = vec![node_id];
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                out.push(node);
            }
            for child in self.nodes[node.0].children.iter().rev() {
                stack.push(*child);
            }
        }
    }

    fn rebuild_id_index(&mut self) {
        let mut next = HashMap::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if let NodeType::Element(element) = &self.nodes[node.0].node_type {
                if let Some(id) = element.attrs.get("id") {
                    if !id.is_empty() {
                        next.entry(id.clone()).or_insert(node);
                    }
                }
            }
            for child in self.nodes[node.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        self.id_index = next;
    }

    /// Starts or stops queueing [`MutationRecord`]s.
    pub fn observe(&mut self, enabled: bool) {
        self.observing = enabled;
        if !enabled {
            self.mutation_records.clear();
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn take_mutation_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutation_records)
    }

    fn record(&mut self, target: NodeId, kind: MutationKind) {
        if self.observing {
            self.mutation_records.push(MutationRecord { target, kind });
        }
    }

    fn record_added(&mut self, parent: NodeId, child: NodeId) {
        self.record(
            parent,
            MutationKind::ChildList {
                added: vec![child],
                removed: Vec::new(),
            },
        );
    }

    fn record_removed(&mut self, parent: NodeId, child: NodeId) {
        self.record(
            parent,
            MutationKind::ChildList {
                added: Vec::new(),
                removed: vec![child],
            },
        );
    }
}

pub(crate) fn class_tokens(class_attr: Option<&str>) -> Vec<String> {
    class_attr
        .map(|value| value.split_whitespace().map(ToOwned::to_owned).collect())
        .unwrap_or_default()
}

pub(crate) fn parse_style_declarations(style_attr: Option<&str>) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    let Some(style_attr) = style_attr else {
        return out;
    };

    for decl in split_style_declarations(style_attr) {
        let Some((name, value)) = decl.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().to_string();
        if let Some(pos) = out.iter().position(|(existing, _)| existing == &name) {
            out[pos].1 = value;
        } else {
            out.push((name, value));
        }
    }

    out
}

/// Splits on `;` outside quotes and parentheses, so `url(data:a;b)` stays
/// whole.
pub(crate) fn split_style_declarations(style_attr: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;

    for (idx, ch) in style_attr.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                out.push(&style_attr[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    out.push(&style_attr[start..]);
    out.into_iter()
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .collect()
}

pub(crate) fn serialize_style_declarations(decls: &[(String, String)]) -> String {
    let mut out = String::new();
    for (idx, (name, value)) in decls.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push(';');
    }
    out
}
