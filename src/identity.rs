use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use ulid::Ulid;

use crate::Result;
use crate::config::TrackerConfig;
use crate::dom::{Dom, NodeId};

/// Opaque record id, also written to the node's id marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Created,
    Modified,
}

/// Best-effort class string. Never fails: SVG elements yield their base
/// value, nodes without a class yield `""`.
pub fn class_string(dom: &Dom, node: NodeId) -> String {
    dom.class_value(node).as_str().unwrap_or_default().to_string()
}

pub(crate) fn generate_id(dom: &Dom, node: NodeId, config: &TrackerConfig) -> TrackId {
    let tag = dom.tag_name(node).unwrap_or("node");
    let first_class = class_string(dom, node)
        .split_whitespace()
        .next()
        .map(sanitize)
        .unwrap_or_default();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let random = Ulid::new().to_string().to_ascii_lowercase();
    // The last ten characters of a ULID are pure entropy.
    let suffix = &random[random.len() - 10..];

    TrackId(format!(
        "{}_{}_{}_{}_{}",
        config.id_prefix, tag, first_class, millis, suffix
    ))
}

fn sanitize(token: &str) -> String {
    token
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '-' })
        .collect()
}

/// Generates an id and writes the kind marker plus the id marker. The two
/// kind markers are mutually exclusive.
pub(crate) fn assign_id(
    dom: &mut Dom,
    node: NodeId,
    kind: RecordKind,
    config: &TrackerConfig,
) -> Result<TrackId> {
    let id = generate_id(dom, node, config);
    let (set, clear) = match kind {
        RecordKind::Created => (config.created_attr(), config.modified_attr()),
        RecordKind::Modified => (config.modified_attr(), config.created_attr()),
    };
    dom.remove_attr(node, &clear)?;
    dom.set_attr(node, &set, "true")?;
    dom.set_attr(node, &config.id_attr(), id.as_str())?;
    Ok(id)
}

/// Removes the kind and id markers. Missing markers are fine.
pub(crate) fn retire_markers(dom: &mut Dom, node: NodeId, config: &TrackerConfig) -> Result<()> {
    if !dom.is_element(node) {
        return Ok(());
    }
    for name in [config.modified_attr(), config.created_attr(), config.id_attr()] {
        dom.remove_attr(node, &name)?;
    }
    Ok(())
}
