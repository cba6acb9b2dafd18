use fancy_regex::Regex;
use serde::Serialize;

use crate::Result;
use crate::config::TrackerConfig;
use crate::dom::{Dom, NodeId, parse_style_declarations, serialize_style_declarations};
use crate::placeholder::placeholders_in_document;
use crate::registry::Registry;

/// Counts from one sweep. Each field is one pass over the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub placeholders_removed: usize,
    pub rescued: usize,
    pub created_removed: usize,
    pub wrappers_removed: usize,
    pub icons_removed: usize,
    pub classes_stripped: usize,
    pub styles_stripped: usize,
    pub markers_stripped: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.placeholders_removed
            + self.rescued
            + self.created_removed
            + self.wrappers_removed
            + self.icons_removed
            + self.classes_stripped
            + self.styles_stripped
            + self.markers_stripped
    }
}

pub(crate) struct Sweeper<'a> {
    config: &'a TrackerConfig,
    registry: &'a Registry,
    style_rules: &'a [Regex],
    report: SweepReport,
}

impl<'a> Sweeper<'a> {
    pub(crate) fn new(
        config: &'a TrackerConfig,
        registry: &'a Registry,
        style_rules: &'a [Regex],
    ) -> Self {
        Self {
            config,
            registry,
            style_rules,
            report: SweepReport::default(),
        }
    }

    /// Removes whatever theme artifacts are still recognizable in `dom`.
    /// Per-element failures are logged and counted, never returned.
    pub(crate) fn run(mut self, dom: &mut Dom) -> SweepReport {
        self.remove_placeholders(dom);
        self.rescue_trapped(dom);
        self.remove_untracked_created(dom);
        self.remove_wrappers(dom);
        self.remove_icons(dom);
        self.strip_classes(dom);
        self.strip_styles(dom);
        self.strip_markers(dom);

        let report = self.report;
        if report.total() > 0 || report.failed > 0 {
            log::info!("sweep cleaned {} artifact(s): {report:?}", report.total());
        } else {
            log::debug!("sweep found nothing");
        }
        report
    }

    fn isolate(&mut self, what: &str, node: NodeId, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                log::warn!("sweep: {what} failed on {node:?}: {err}");
                self.report.failed += 1;
                false
            }
        }
    }

    fn select(&mut self, dom: &Dom, selector: &str) -> Vec<NodeId> {
        match dom.query_selector_all(selector) {
            Ok(nodes) => nodes,
            Err(err) => {
                log::warn!("sweep: skipping selector `{selector}`: {err}");
                self.report.failed += 1;
                Vec::new()
            }
        }
    }

    fn remove_placeholders(&mut self, dom: &mut Dom) {
        for placeholder in placeholders_in_document(dom, self.config) {
            let result = dom.remove_node(placeholder);
            if self.isolate("placeholder removal", placeholder, result) {
                self.report.placeholders_removed += 1;
            }
        }
    }

    fn rescue_trapped(&mut self, dom: &mut Dom) {
        let scope = self.config.sweep.rescue_scope.clone();
        for selector in self.config.sweep.important_selectors.clone() {
            for node in self.select(dom, &selector) {
                let Some(parent) = dom.parent(node) else {
                    continue;
                };
                let wrapper = match dom.closest(parent, &scope) {
                    Ok(Some(wrapper)) => wrapper,
                    Ok(None) => continue,
                    Err(err) => {
                        log::warn!("sweep: bad rescue scope `{scope}`: {err}");
                        self.report.failed += 1;
                        return;
                    }
                };
                if self.registry.is_tracked(wrapper) {
                    continue;
                }
                let result = self.relocate(dom, node, wrapper);
                if self.isolate("rescue", node, result) {
                    self.report.rescued += 1;
                }
            }
        }
    }

    fn remove_untracked_created(&mut self, dom: &mut Dom) {
        let selector = format!("[{}]", self.config.created_attr());
        for node in self.select(dom, &selector) {
            if self.registry.is_tracked(node) || !dom.is_connected(node) {
                continue;
            }
            let result = self.rescue_descendants(dom, node);
            let result = result.and_then(|()| dom.remove_node(node));
            if self.isolate("created element removal", node, result) {
                self.report.created_removed += 1;
            }
        }
    }

    fn remove_wrappers(&mut self, dom: &mut Dom) {
        for selector in self.config.sweep.wrapper_selectors.clone() {
            for wrapper in self.select(dom, &selector) {
                if self.registry.is_tracked(wrapper) || !dom.is_connected(wrapper) {
                    continue;
                }
                let result = self.rescue_descendants(dom, wrapper);
                let result = result.and_then(|()| dom.remove_node(wrapper));
                if self.isolate("wrapper removal", wrapper, result) {
                    self.report.wrappers_removed += 1;
                }
            }
        }
    }

    fn remove_icons(&mut self, dom: &mut Dom) {
        let selector = format!("[{}]", self.config.icon_attr());
        for icon in self.select(dom, &selector) {
            if dom.parent(icon).is_none() {
                continue;
            }
            let result = dom.remove_node(icon);
            if self.isolate("icon removal", icon, result) {
                self.report.icons_removed += 1;
            }
        }
    }

    fn strip_classes(&mut self, dom: &mut Dom) {
        let config = self.config;
        let keywords = &config.sweep.class_keywords;
        if keywords.is_empty() {
            return;
        }
        for node in dom.all_elements() {
            if self.registry.is_tracked(node) {
                continue;
            }
            let tokens = dom.class_tokens(node);
            let kept: Vec<&str> = tokens
                .iter()
                .map(String::as_str)
                .filter(|token| !keywords.iter().any(|keyword| token.contains(keyword.as_str())))
                .collect();
            if kept.len() == tokens.len() {
                continue;
            }
            let result = if kept.is_empty() {
                dom.remove_attr(node, "class")
            } else {
                dom.set_class_name(node, &kept.join(" "))
            };
            if self.isolate("class strip", node, result) {
                self.report.classes_stripped += 1;
            }
        }
    }

    fn strip_styles(&mut self, dom: &mut Dom) {
        if self.style_rules.is_empty() {
            return;
        }
        for node in dom.all_elements() {
            if self.registry.is_tracked(node) {
                continue;
            }
            let Some(style) = dom.attr(node, "style") else {
                continue;
            };
            let decls = parse_style_declarations(Some(style));
            let kept: Vec<(String, String)> = decls
                .iter()
                .filter(|(name, value)| !self.is_theme_declaration(name, value))
                .cloned()
                .collect();
            if kept.len() == decls.len() {
                continue;
            }
            let result = dom.set_style_text(node, &serialize_style_declarations(&kept));
            if self.isolate("style strip", node, result) {
                self.report.styles_stripped += 1;
            }
        }
    }

    fn is_theme_declaration(&self, name: &str, value: &str) -> bool {
        let declaration = format!("{name}: {value}");
        self.style_rules.iter().any(|rule| match rule.is_match(&declaration) {
            Ok(matched) => matched,
            Err(err) => {
                log::warn!("sweep: style rule `{}` gave up: {err}", rule.as_str());
                false
            }
        })
    }

    fn strip_markers(&mut self, dom: &mut Dom) {
        for node in dom.all_elements() {
            if self.registry.is_tracked(node) {
                continue;
            }
            let stale: Vec<String> = dom
                .attributes(node)
                .into_iter()
                .map(|(name, _)| name)
                .filter(|name| self.config.is_bookkeeping_attr(name))
                .collect();
            if stale.is_empty() {
                continue;
            }
            let result = stale
                .iter()
                .try_for_each(|name| dom.remove_attr(node, name));
            if self.isolate("marker strip", node, result) {
                self.report.markers_stripped += 1;
            }
        }
    }

    /// Moves important host content out of `container` before it goes away.
    fn rescue_descendants(&mut self, dom: &mut Dom, container: NodeId) -> Result<()> {
        for selector in self.config.sweep.important_selectors.clone() {
            let found = dom.query_selector_all_from(container, &selector)?;
            for node in found {
                // Nested matches travel with their outermost important ancestor.
                if !dom.is_descendant_of(node, container) {
                    continue;
                }
                self.relocate(dom, node, container)?;
                self.report.rescued += 1;
            }
        }
        Ok(())
    }

    fn relocate(&self, dom: &mut Dom, node: NodeId, trap: NodeId) -> Result<()> {
        let target = self.fallback_container(dom, node, trap);
        log::debug!("sweep: relocating {node:?} out of {trap:?} into {target:?}");
        dom.append_child(target, node)
    }

    /// First connected fallback container outside both the trap and the
    /// node being moved. Falls back to body, then the document itself.
    fn fallback_container(&self, dom: &Dom, node: NodeId, trap: NodeId) -> NodeId {
        let usable = |candidate: NodeId| {
            dom.is_connected(candidate)
                && !dom.contains(trap, candidate)
                && !dom.contains(node, candidate)
        };
        for selector in &self.config.sweep.fallback_containers {
            let Ok(candidates) = dom.query_selector_all(selector) else {
                continue;
            };
            if let Some(container) = candidates.into_iter().find(|c| usable(*c)) {
                return container;
            }
        }
        dom.body().filter(|body| usable(*body)).unwrap_or(dom.root())
    }
}
