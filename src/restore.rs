use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::TrackerConfig;
use crate::dom::{Dom, NodeId};
use crate::identity::{TrackId, retire_markers};
use crate::placeholder::{placeholders_in_document, remove_placeholder};
use crate::registry::{RecordState, Registry, TrackedRecord};
use crate::snapshot::{Snapshot, content_matches};
use crate::{Error, Result};

/// Counts from one restoration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Modified nodes replayed, including partially restored ones.
    pub restored: usize,
    /// Created nodes detached.
    pub removed: usize,
    /// Nodes where at least one restoration step failed.
    pub failed: usize,
    pub orphaned_placeholders: usize,
}

/// Outcome of replaying a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Clean,
    /// Some steps failed and were skipped. The record is still dropped.
    Partial { failures: usize },
}

/// Replays every record and empties the registry.
///
/// Modified nodes go deepest-first by their depth when the pass starts, so
/// a content overwrite on an ancestor can never run before a descendant's
/// own restoration. A moved node counts from its placeholder, which keeps it
/// ahead of whatever modified node holds its original slot. Created nodes
/// are detached afterwards, then leftover placeholders. The registry is
/// cleared whatever happened.
pub(crate) fn restore_all(
    dom: &mut Dom,
    registry: &mut Registry,
    config: &TrackerConfig,
) -> RestoreReport {
    let mut report = RestoreReport::default();

    let anchors: HashMap<NodeId, NodeId> = registry
        .modified()
        .filter_map(|record| Some((record.node, record.snapshot()?.placeholder?)))
        .filter(|(_, placeholder)| dom.is_connected(*placeholder))
        .collect();
    let mut order: Vec<(usize, u64, TrackId)> = registry
        .modified()
        .map(|record| {
            (
                slot_depth(dom, record.node, &anchors),
                record.sequence,
                record.id.clone(),
            )
        })
        .collect();
    order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (depth, _, id) in order {
        match restore_one(dom, registry, config, &id) {
            Ok(RestoreOutcome::Clean) => report.restored += 1,
            Ok(RestoreOutcome::Partial { failures }) => {
                log::warn!("restored {id} at depth {depth} with {failures} failed step(s)");
                report.restored += 1;
                report.failed += 1;
            }
            Err(err) => {
                log::warn!("could not restore {id}: {err}");
                report.failed += 1;
            }
        }
    }

    let created: Vec<(TrackId, NodeId)> = registry
        .created()
        .map(|record| (record.id.clone(), record.node))
        .collect();
    for (id, node) in created {
        registry.remove(&id);
        if dom.parent(node).is_none() {
            log::debug!("created node {id} already detached");
            continue;
        }
        match dom.remove_node(node) {
            Ok(()) => report.removed += 1,
            Err(err) => {
                log::warn!("could not remove created node {id}: {err}");
                report.failed += 1;
            }
        }
    }

    let mut leftovers = registry.take_placeholders();
    for placeholder in placeholders_in_document(dom, config) {
        if !leftovers.contains(&placeholder) {
            leftovers.push(placeholder);
        }
    }
    for placeholder in leftovers {
        match remove_placeholder(dom, placeholder) {
            Ok(true) => report.orphaned_placeholders += 1,
            Ok(false) => {}
            Err(err) => log::warn!("could not remove placeholder {placeholder:?}: {err}"),
        }
    }

    registry.clear();
    log::info!(
        "restoration finished: restored={} removed={} failed={} orphaned_placeholders={}",
        report.restored,
        report.removed,
        report.failed,
        report.orphaned_placeholders
    );
    report
}

/// Depth of `node` with every anchored node on the way up counted at its
/// placeholder's position.
fn slot_depth(dom: &Dom, node: NodeId, anchors: &HashMap<NodeId, NodeId>) -> usize {
    let mut visited = HashSet::new();
    let mut depth = 0usize;
    let mut cursor = node;
    while visited.insert(cursor) {
        let up = match anchors.get(&cursor) {
            Some(placeholder) => dom.parent(*placeholder),
            None => dom.parent(cursor),
        };
        let Some(parent) = up else {
            return depth;
        };
        depth += 1;
        cursor = parent;
    }
    // A placeholder inside its own node's subtree; plain depth will do.
    dom.depth(node)
}

/// Replays one modified record and drops it from the registry.
///
/// Steps run in a fixed order: reposition, content, class, style,
/// attributes, markers. A failing step is logged and skipped; the remaining
/// steps still run.
pub(crate) fn restore_one(
    dom: &mut Dom,
    registry: &mut Registry,
    config: &TrackerConfig,
    id: &TrackId,
) -> Result<RestoreOutcome> {
    match registry.get(id) {
        None => return Err(Error::InvalidRecord(format!("no record for {id}"))),
        Some(record) if record.snapshot().is_none() => {
            return Err(Error::InvalidRecord(format!(
                "{id} is a created record and has nothing to restore"
            )));
        }
        Some(_) => {}
    }
    let Some(record) = registry.remove(id) else {
        return Err(Error::InvalidRecord(format!("no record for {id}")));
    };
    let Some(snapshot) = record.snapshot() else {
        return Err(Error::InvalidRecord(format!("{id} lost its snapshot")));
    };

    let node = record.node;
    let mut failures = 0usize;
    let mut step = |name: &str, result: Result<()>| {
        if let Err(err) = result {
            log::warn!("{id}: {name} step failed: {err}");
            failures += 1;
        }
    };

    step("reposition", reposition(dom, &record, snapshot));
    step("content", restore_content(dom, node, snapshot, config));
    step("class", restore_class(dom, node, snapshot));
    step("style", restore_style(dom, node, snapshot));
    let attribute_failures = restore_attributes(dom, node, snapshot, config, id);
    step(
        "attribute order",
        dom.reorder_attributes(node, snapshot.attributes.keys().map(String::as_str)),
    );
    failures += attribute_failures;
    if let Err(err) = retire_markers(dom, node, config)
        .and_then(|()| dom.remove_attr(node, &config.hidden_attr()))
    {
        log::warn!("{id}: could not retire markers: {err}");
        failures += 1;
    }

    log::debug!("restored {id}");
    Ok(if failures == 0 {
        RestoreOutcome::Clean
    } else {
        RestoreOutcome::Partial { failures }
    })
}

fn reposition(dom: &mut Dom, record: &TrackedRecord, snapshot: &Snapshot) -> Result<()> {
    let node = record.node;

    if let Some(placeholder) = snapshot.placeholder {
        if dom.is_connected(placeholder) {
            if let Some(parent) = dom.parent(placeholder) {
                dom.insert_before(parent, node, placeholder)?;
                dom.remove_node(placeholder)?;
                return Ok(());
            }
        }
    }

    // A node that left the document on its own stays where it is. Retired
    // nodes were detached by the theme and may still go home.
    if !dom.is_connected(node) && record.state != RecordState::Retired {
        log::debug!("{}: node is detached, not repositioning", record.id);
        return Ok(());
    }
    if !snapshot.was_moved {
        return Ok(());
    }
    let Some(parent) = snapshot.prior_parent else {
        return Ok(());
    };
    if !dom.is_connected(parent) {
        log::debug!("{}: prior parent is gone, leaving node in place", record.id);
        return Ok(());
    }

    let sibling = snapshot
        .prior_next_sibling
        .filter(|sibling| *sibling != node && dom.parent(*sibling) == Some(parent));
    if dom.parent(node) == Some(parent) && sibling.is_none_or(|s| dom.next_sibling(node) == Some(s))
    {
        return Ok(());
    }
    match sibling {
        Some(sibling) => dom.insert_before(parent, node, sibling),
        None => dom.append_child(parent, node),
    }
}

fn restore_content(
    dom: &mut Dom,
    node: NodeId,
    snapshot: &Snapshot,
    config: &TrackerConfig,
) -> Result<()> {
    let Some(content) = snapshot.inner_content.as_captured() else {
        return Ok(());
    };
    // Unchanged content is left alone so live references into the subtree
    // stay valid.
    if content_matches(dom, node, content, config)? {
        return Ok(());
    }
    dom.set_inner_html(node, content)
}

fn restore_class(dom: &mut Dom, node: NodeId, snapshot: &Snapshot) -> Result<()> {
    if snapshot.class_name.is_empty() && !snapshot.had_class_attr() {
        if dom.has_attr(node, "class") {
            dom.remove_attr(node, "class")?;
        }
        return Ok(());
    }
    if dom.attr(node, "class") == Some(snapshot.class_name.as_str()) {
        return Ok(());
    }
    dom.set_class_name(node, &snapshot.class_name)
}

fn restore_style(dom: &mut Dom, node: NodeId, snapshot: &Snapshot) -> Result<()> {
    if dom.style_text(node) == snapshot.style_text {
        return Ok(());
    }
    dom.set_style_text(node, &snapshot.style_text)
}

/// Writes back every prior attribute except class and style, which have
/// their own steps. Returns the number of rejected writes.
fn restore_attributes(
    dom: &mut Dom,
    node: NodeId,
    snapshot: &Snapshot,
    config: &TrackerConfig,
    id: &TrackId,
) -> usize {
    let mut failures = 0usize;
    for (name, value) in &snapshot.attributes {
        if name == "class" || name == "style" || config.is_bookkeeping_attr(name) {
            continue;
        }
        if dom.attr(node, name) == Some(value.as_str()) {
            continue;
        }
        if let Err(err) = dom.set_attr(node, name, value) {
            log::warn!("{id}: attribute `{name}` rejected: {err}");
            failures += 1;
        }
    }
    failures
}
