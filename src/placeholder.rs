use crate::config::TrackerConfig;
use crate::dom::{Dom, NodeId};
use crate::identity::TrackId;
use crate::{Error, Result};

/// Inserts an invisible anchor right before `node` so its slot can be found
/// again after siblings shift.
pub(crate) fn create_placeholder(
    dom: &mut Dom,
    node: NodeId,
    id: &TrackId,
    config: &TrackerConfig,
) -> Result<NodeId> {
    let Some(parent) = dom.parent(node) else {
        return Err(Error::Dom(format!("cannot anchor detached node {id}")));
    };

    let placeholder = dom.create_element("div");
    dom.set_attr(placeholder, &config.placeholder_attr(), id.as_str())?;
    dom.set_attr(placeholder, "style", "display: none;")?;
    dom.insert_before(parent, placeholder, node)?;
    log::debug!("placeholder for {id} anchored under {parent:?}");
    Ok(placeholder)
}

/// Detaches the placeholder. Returns whether it was still attached.
pub(crate) fn remove_placeholder(dom: &mut Dom, placeholder: NodeId) -> Result<bool> {
    if dom.parent(placeholder).is_none() {
        return Ok(false);
    }
    dom.remove_node(placeholder)?;
    Ok(true)
}

pub(crate) fn is_placeholder(dom: &Dom, node: NodeId, config: &TrackerConfig) -> bool {
    dom.has_attr(node, &config.placeholder_attr())
}

/// Every placeholder currently in the document, tracked or not.
pub(crate) fn placeholders_in_document(dom: &Dom, config: &TrackerConfig) -> Vec<NodeId> {
    dom.all_elements()
        .into_iter()
        .filter(|node| is_placeholder(dom, *node, config))
        .collect()
}
