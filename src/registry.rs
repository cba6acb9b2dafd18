use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

use crate::dom::{Dom, NodeId};
use crate::identity::{RecordKind, TrackId};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Live,
    /// The theme itself detached the node. Restoration puts it back.
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordDetail {
    Created { label: String },
    Modified(Box<Snapshot>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRecord {
    pub(crate) id: TrackId,
    pub(crate) node: NodeId,
    pub(crate) state: RecordState,
    pub(crate) sequence: u64,
    pub(crate) detail: RecordDetail,
}

impl TrackedRecord {
    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Position in recording order.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn kind(&self) -> RecordKind {
        match self.detail {
            RecordDetail::Created { .. } => RecordKind::Created,
            RecordDetail::Modified(_) => RecordKind::Modified,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match &self.detail {
            RecordDetail::Created { label } => Some(label),
            RecordDetail::Modified(_) => None,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match &self.detail {
            RecordDetail::Modified(snapshot) => Some(&**snapshot),
            RecordDetail::Created { .. } => None,
        }
    }

    pub(crate) fn snapshot_mut(&mut self) -> Option<&mut Snapshot> {
        match &mut self.detail {
            RecordDetail::Modified(snapshot) => Some(&mut **snapshot),
            RecordDetail::Created { .. } => None,
        }
    }
}

/// The session undo log: one map for both record kinds, a reverse index by
/// node, and the placeholder pool.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: IndexMap<TrackId, TrackedRecord>,
    by_node: HashMap<NodeId, TrackId>,
    placeholders: Vec<NodeId>,
    next_sequence: u64,
    active: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self) {
        self.clear();
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drops every record and placeholder reference and deactivates.
    pub fn clear(&mut self) {
        self.records.clear();
        self.by_node.clear();
        self.placeholders.clear();
        self.active = false;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.placeholders.is_empty()
    }

    pub(crate) fn insert(&mut self, id: TrackId, node: NodeId, detail: RecordDetail) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.by_node.insert(node, id.clone());
        self.records.insert(
            id.clone(),
            TrackedRecord {
                id,
                node,
                state: RecordState::Live,
                sequence,
                detail,
            },
        );
    }

    pub fn get(&self, id: &TrackId) -> Option<&TrackedRecord> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &TrackId) -> Option<&mut TrackedRecord> {
        self.records.get_mut(id)
    }

    pub fn id_of(&self, node: NodeId) -> Option<&TrackId> {
        self.by_node.get(&node)
    }

    pub fn by_node(&self, node: NodeId) -> Option<&TrackedRecord> {
        self.records.get(self.by_node.get(&node)?)
    }

    pub fn is_tracked(&self, node: NodeId) -> bool {
        self.by_node.contains_key(&node)
    }

    pub(crate) fn remove(&mut self, id: &TrackId) -> Option<TrackedRecord> {
        let record = self.records.shift_remove(id)?;
        if self.by_node.get(&record.node) == Some(id) {
            self.by_node.remove(&record.node);
        }
        if let Some(placeholder) = record.snapshot().and_then(|s| s.placeholder) {
            self.forget_placeholder(placeholder);
        }
        Some(record)
    }

    pub fn records(&self) -> impl Iterator<Item = &TrackedRecord> {
        self.records.values()
    }

    pub fn modified(&self) -> impl Iterator<Item = &TrackedRecord> {
        self.records
            .values()
            .filter(|record| record.kind() == RecordKind::Modified)
    }

    pub fn created(&self) -> impl Iterator<Item = &TrackedRecord> {
        self.records
            .values()
            .filter(|record| record.kind() == RecordKind::Created)
    }

    pub fn placeholders(&self) -> &[NodeId] {
        &self.placeholders
    }

    pub(crate) fn add_placeholder(&mut self, placeholder: NodeId) {
        if !self.placeholders.contains(&placeholder) {
            self.placeholders.push(placeholder);
        }
    }

    pub(crate) fn forget_placeholder(&mut self, placeholder: NodeId) {
        self.placeholders.retain(|node| *node != placeholder);
    }

    pub(crate) fn take_placeholders(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.placeholders)
    }

    pub fn status(&self, dom: &Dom) -> TrackingStatus {
        let entries: Vec<TrackingEntry> = self
            .records
            .values()
            .map(|record| TrackingEntry {
                id: record.id.clone(),
                kind: record.kind(),
                state: record.state,
                tag: dom.tag_name(record.node).map(str::to_string),
                label: record.label().map(str::to_string),
                connected: dom.is_connected(record.node),
            })
            .collect();

        TrackingStatus {
            active: self.active,
            modifications_count: entries
                .iter()
                .filter(|e| e.kind == RecordKind::Modified && e.state == RecordState::Live)
                .count(),
            created_elements_count: entries
                .iter()
                .filter(|e| e.kind == RecordKind::Created)
                .count(),
            placeholders_count: self.placeholders.len(),
            retired_count: entries
                .iter()
                .filter(|e| e.state == RecordState::Retired)
                .count(),
            entries,
        }
    }
}

/// Read-only view of the registry for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingStatus {
    pub active: bool,
    pub modifications_count: usize,
    pub created_elements_count: usize,
    pub placeholders_count: usize,
    pub retired_count: usize,
    pub entries: Vec<TrackingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingEntry {
    pub id: TrackId,
    pub kind: RecordKind,
    pub state: RecordState,
    pub tag: Option<String>,
    pub label: Option<String>,
    pub connected: bool,
}
