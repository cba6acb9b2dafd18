use std::collections::HashMap;

use fancy_regex::Regex;
use indexmap::IndexMap;

use crate::config::TrackerConfig;
use crate::dom::{Dom, NodeId};
use crate::identity::{RecordKind, TrackId, assign_id};
use crate::placeholder::create_placeholder;
use crate::registry::{RecordDetail, RecordState, Registry, TrackingStatus};
use crate::restore::{self, RestoreOutcome, RestoreReport};
use crate::session::WatchedNode;
use crate::snapshot::{Snapshot, SnapshotOverrides};
use crate::sweep::{SweepReport, Sweeper};
use crate::{Error, Result};

/// Records what a theme does to a document so it can be undone.
///
/// One tracker lives for one enable/disable cycle. Every cosmetic change
/// goes through it before it is made: [`record_creation`] for new nodes,
/// [`record_modification`] for existing ones. [`restore_all`] undoes the lot.
///
/// [`record_creation`]: ThemeTracker::record_creation
/// [`record_modification`]: ThemeTracker::record_modification
/// [`restore_all`]: ThemeTracker::restore_all
#[derive(Debug)]
pub struct ThemeTracker {
    config: TrackerConfig,
    style_rules: Vec<Regex>,
    registry: Registry,
    restoring: bool,
    style_changes: HashMap<NodeId, IndexMap<String, String>>,
}

impl ThemeTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let style_rules = config.compile_style_rules()?;
        Ok(Self {
            config,
            style_rules,
            registry: Registry::new(),
            restoring: false,
            style_changes: HashMap::new(),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a fresh session. Anything recorded before is forgotten.
    pub fn init(&mut self) {
        self.registry.init();
        self.style_changes.clear();
        log::info!("tracking initialized");
    }

    pub fn is_active(&self) -> bool {
        self.registry.is_active()
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    pub(crate) fn set_restoring(&mut self, restoring: bool) {
        self.restoring = restoring;
    }

    pub fn id_of(&self, node: NodeId) -> Option<&TrackId> {
        self.registry.id_of(node)
    }

    fn ensure_recordable(&self, dom: &Dom, node: NodeId, what: &str) -> Result<()> {
        if !self.registry.is_active() {
            return Err(Error::InvalidRecord(format!(
                "cannot record {what}: tracking is not active"
            )));
        }
        if !dom.is_element(node) {
            return Err(Error::InvalidRecord(format!(
                "cannot record {what}: {node:?} is not an element"
            )));
        }
        Ok(())
    }

    /// Tags a node the theme just created so restoration deletes it.
    pub fn record_creation(&mut self, dom: &mut Dom, node: NodeId, label: &str) -> Result<TrackId> {
        self.ensure_recordable(dom, node, "creation")?;
        if let Some(existing) = self.registry.by_node(node) {
            return match existing.kind() {
                RecordKind::Created => Ok(existing.id().clone()),
                RecordKind::Modified => Err(Error::InvalidRecord(format!(
                    "{} already holds a modification snapshot",
                    existing.id()
                ))),
            };
        }

        let id = assign_id(dom, node, RecordKind::Created, &self.config)?;
        self.registry.insert(
            id.clone(),
            node,
            RecordDetail::Created {
                label: label.to_string(),
            },
        );
        log::debug!("tracked creation {id} ({label})");
        Ok(id)
    }

    /// Snapshots a node's pre-theme state. Only the first call per node
    /// records anything; later calls return the same id.
    pub fn record_modification(
        &mut self,
        dom: &mut Dom,
        node: NodeId,
        overrides: SnapshotOverrides,
    ) -> Result<TrackId> {
        self.ensure_recordable(dom, node, "modification")?;
        if let Some(existing) = self.registry.by_node(node) {
            return match existing.kind() {
                RecordKind::Modified => {
                    log::debug!("{} already tracked, keeping first snapshot", existing.id());
                    Ok(existing.id().clone())
                }
                RecordKind::Created => Err(Error::InvalidRecord(format!(
                    "{} was created by the theme and has no prior state",
                    existing.id()
                ))),
            };
        }
        if dom.has_attr(node, &self.config.modified_attr()) {
            log::debug!("{node:?} carries a stale modified marker, recording fresh");
        }

        let snapshot = Snapshot::capture(dom, node, overrides, &self.config)?;
        if let Some(placeholder) = snapshot.placeholder {
            self.registry.add_placeholder(placeholder);
        }
        let id = assign_id(dom, node, RecordKind::Modified, &self.config)?;
        self.registry
            .insert(id.clone(), node, RecordDetail::Modified(Box::new(snapshot)));
        log::debug!("tracked modification {id}");
        Ok(id)
    }

    /// Call before moving `node` from `from_parent` to `to_parent`. Leaves a
    /// placeholder in the node's current slot the first time it moves.
    pub fn record_move(
        &mut self,
        dom: &mut Dom,
        node: NodeId,
        from_parent: NodeId,
        to_parent: NodeId,
    ) -> Result<TrackId> {
        let overrides = SnapshotOverrides::default().prior_parent(from_parent);
        let id = self.record_modification(dom, node, overrides)?;

        let needs_anchor = self
            .registry
            .get(&id)
            .and_then(|record| record.snapshot())
            .is_some_and(|snapshot| snapshot.placeholder.is_none());
        let placeholder = if needs_anchor && dom.parent(node).is_some() {
            Some(create_placeholder(dom, node, &id, &self.config)?)
        } else {
            None
        };

        if let Some(snapshot) = self
            .registry
            .get_mut(&id)
            .and_then(|record| record.snapshot_mut())
        {
            snapshot.was_moved = true;
            if placeholder.is_some() {
                snapshot.placeholder = placeholder;
            }
        }
        if let Some(placeholder) = placeholder {
            self.registry.add_placeholder(placeholder);
        }
        log::debug!("tracked move {id}: {from_parent:?} -> {to_parent:?}");
        Ok(id)
    }

    /// Remembers the first value seen for `property` on `node`.
    pub fn record_style_change(&mut self, node: NodeId, property: &str, prior_value: &str) {
        self.style_changes
            .entry(node)
            .or_default()
            .entry(property.to_ascii_lowercase())
            .or_insert_with(|| prior_value.to_string());
    }

    pub fn style_changes(&self, node: NodeId) -> Option<&IndexMap<String, String>> {
        self.style_changes.get(&node)
    }

    /// Hides a host node behind `display: none`, recording it first.
    pub fn hide(&mut self, dom: &mut Dom, node: NodeId) -> Result<TrackId> {
        let id = self.record_modification(dom, node, SnapshotOverrides::default())?;
        let prior = dom.style_get(node, "display").unwrap_or_default();
        self.record_style_change(node, "display", &prior);
        dom.style_set(node, "display", "none")?;
        dom.set_attr(node, &self.config.hidden_attr(), "true")?;
        if let Some(snapshot) = self
            .registry
            .get_mut(&id)
            .and_then(|record| record.snapshot_mut())
        {
            snapshot.hidden_by_theme = true;
        }
        Ok(id)
    }

    /// Detaches a host node on the theme's behalf. A placeholder keeps its
    /// slot so restoration can put it back.
    pub fn retire(&mut self, dom: &mut Dom, node: NodeId) -> Result<TrackId> {
        let id = self.record_modification(dom, node, SnapshotOverrides::default())?;
        if dom.parent(node).is_some() {
            let has_anchor = self
                .registry
                .get(&id)
                .and_then(|record| record.snapshot())
                .and_then(|snapshot| snapshot.placeholder)
                .is_some_and(|placeholder| dom.is_connected(placeholder));
            let placeholder = if has_anchor {
                None
            } else {
                Some(create_placeholder(dom, node, &id, &self.config)?)
            };
            dom.remove_node(node)?;

            if let Some(snapshot) = self
                .registry
                .get_mut(&id)
                .and_then(|record| record.snapshot_mut())
            {
                if placeholder.is_some() {
                    snapshot.placeholder = placeholder;
                }
            }
            if let Some(placeholder) = placeholder {
                self.registry.add_placeholder(placeholder);
            }
        }
        if let Some(record) = self.registry.get_mut(&id) {
            record.state = RecordState::Retired;
        }
        log::debug!("retired {id}");
        Ok(id)
    }

    /// Deletes a created node right away instead of waiting for restoration.
    /// Returns whether the node was tracked.
    pub fn remove_creation(&mut self, dom: &mut Dom, node: NodeId) -> Result<bool> {
        let Some(record) = self.registry.by_node(node) else {
            return Ok(false);
        };
        if record.kind() != RecordKind::Created {
            return Err(Error::InvalidRecord(format!(
                "{} is not a created record",
                record.id()
            )));
        }
        let id = record.id().clone();
        self.registry.remove(&id);
        dom.remove_node(node)?;
        log::debug!("removed creation {id}");
        Ok(true)
    }

    /// Restores one modified node ahead of the bulk pass.
    pub fn restore_node(&mut self, dom: &mut Dom, node: NodeId) -> Result<RestoreOutcome> {
        let Some(id) = self.registry.id_of(node).cloned() else {
            return Err(Error::InvalidRecord(format!("{node:?} is not tracked")));
        };
        restore::restore_one(dom, &mut self.registry, &self.config, &id)
    }

    /// Undoes everything recorded and ends the session. Calling it again
    /// afterwards does nothing.
    pub fn restore_all(&mut self, dom: &mut Dom) -> RestoreReport {
        if self.registry.is_empty() {
            self.registry.clear();
            log::debug!("nothing to restore");
            return RestoreReport::default();
        }

        let was_restoring = self.restoring;
        self.restoring = true;
        let report = restore::restore_all(dom, &mut self.registry, &self.config);
        self.style_changes.clear();
        self.restoring = was_restoring;
        report
    }

    pub fn sweep(&self, dom: &mut Dom) -> SweepReport {
        Sweeper::new(&self.config, &self.registry, &self.style_rules).run(dom)
    }

    /// Restoration followed by the sweep, which always runs.
    pub fn cleanup(&mut self, dom: &mut Dom) -> (RestoreReport, SweepReport) {
        let restored = self.restore_all(dom);
        let swept = self.sweep(dom);
        (restored, swept)
    }

    pub fn status(&self, dom: &Dom) -> TrackingStatus {
        self.registry.status(dom)
    }

    /// Nodes whose visibility should be re-checked after restoration, with
    /// the inline visibility styles each had before the theme.
    pub(crate) fn visibility_watchlist(&self) -> Vec<WatchedNode> {
        self.registry
            .modified()
            .filter_map(|record| {
                let snapshot = record.snapshot()?;
                Some(WatchedNode {
                    node: record.node(),
                    display: snapshot.prior_display.clone(),
                    visibility: snapshot.prior_visibility.clone(),
                    opacity: snapshot.prior_opacity.clone(),
                })
            })
            .collect()
    }
}
