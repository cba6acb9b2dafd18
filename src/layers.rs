use crate::Result;
use crate::dom::{Dom, NodeId};
use crate::snapshot::SnapshotOverrides;
use crate::tracker::ThemeTracker;

/// A presentation step that themes part of the page. Every change it makes
/// must go through the tracker first.
pub trait ThemeLayer {
    fn name(&self) -> &str;

    fn apply(&mut self, dom: &mut Dom, tracker: &mut ThemeTracker) -> Result<()>;

    /// Called with host elements inserted while the theme is on.
    fn on_mutations(
        &mut self,
        dom: &mut Dom,
        tracker: &mut ThemeTracker,
        added: &[NodeId],
    ) -> Result<()> {
        let _ = (dom, tracker, added);
        Ok(())
    }
}

/// `added` roots plus their descendants that match `selector`, in document
/// order, skipping anything the tracker already owns.
fn matching_in(
    dom: &Dom,
    tracker: &ThemeTracker,
    added: &[NodeId],
    selector: &str,
) -> Result<Vec<NodeId>> {
    let mut out = Vec::new();
    for root in added {
        if !dom.is_connected(*root) {
            continue;
        }
        if dom.matches_selector(*root, selector)? {
            out.push(*root);
        }
        out.extend(dom.query_selector_all_from(*root, selector)?);
    }
    out.retain(|node| tracker.id_of(*node).is_none());
    out.dedup();
    Ok(out)
}

/// Restyles headers and swaps the logo for a themed image.
#[derive(Debug, Clone)]
pub struct HeaderLayer {
    pub header_selector: String,
    pub header_class: String,
    pub header_style: Vec<(String, String)>,
    pub logo_selector: String,
    pub logo_src: String,
}

impl Default for HeaderLayer {
    fn default() -> Self {
        Self {
            header_selector: "header".to_string(),
            header_class: "theme-header".to_string(),
            header_style: vec![
                ("font-family".to_string(), "Cinzel, serif".to_string()),
                ("border-bottom".to_string(), "2px solid #8b5a2b".to_string()),
            ],
            logo_selector: ".header-logo".to_string(),
            logo_src: "theme-assets/crest.png".to_string(),
        }
    }
}

impl HeaderLayer {
    fn restyle(&self, dom: &mut Dom, tracker: &mut ThemeTracker, header: NodeId) -> Result<()> {
        let before = SnapshotOverrides::default().style_text(dom.style_text(header));
        tracker.record_modification(dom, header, before)?;
        for (property, value) in &self.header_style {
            let prior = dom.style_get(header, property).unwrap_or_default();
            tracker.record_style_change(header, property, &prior);
            dom.style_set(header, property, value)?;
        }
        dom.class_add(header, &self.header_class)
    }

    fn swap_logo(&self, dom: &mut Dom, tracker: &mut ThemeTracker, logo: NodeId) -> Result<()> {
        tracker.record_modification(dom, logo, SnapshotOverrides::default())?;
        dom.set_inner_html(
            logo,
            &format!(
                "<img class=\"theme-logo\" src=\"{}\" alt=\"\">",
                self.logo_src.replace('"', "&quot;")
            ),
        )
    }
}

impl ThemeLayer for HeaderLayer {
    fn name(&self) -> &str {
        "header"
    }

    fn apply(&mut self, dom: &mut Dom, tracker: &mut ThemeTracker) -> Result<()> {
        for header in dom.query_selector_all(&self.header_selector)? {
            self.restyle(dom, tracker, header)?;
        }
        for logo in dom.query_selector_all(&self.logo_selector)? {
            self.swap_logo(dom, tracker, logo)?;
        }
        Ok(())
    }
}

/// Wraps target containers in a decorative frame.
#[derive(Debug, Clone)]
pub struct FrameLayer {
    pub target_selector: String,
    pub wrapper_class: String,
}

impl Default for FrameLayer {
    fn default() -> Self {
        Self {
            target_selector: ".js-profile-timeline-container".to_string(),
            wrapper_class: "theme-frame-wrapper".to_string(),
        }
    }
}

impl FrameLayer {
    fn wrap(&self, dom: &mut Dom, tracker: &mut ThemeTracker, target: NodeId) -> Result<()> {
        let Some(parent) = dom.parent(target) else {
            return Ok(());
        };
        if dom.class_contains(parent, &self.wrapper_class) {
            return Ok(());
        }

        let wrapper = dom.create_element("div");
        dom.set_class_name(wrapper, &self.wrapper_class)?;
        tracker.record_creation(dom, wrapper, "frame wrapper")?;
        tracker.record_move(dom, target, parent, wrapper)?;
        dom.insert_before(parent, wrapper, target)?;
        dom.append_child(wrapper, target)
    }
}

impl ThemeLayer for FrameLayer {
    fn name(&self) -> &str {
        "frame"
    }

    fn apply(&mut self, dom: &mut Dom, tracker: &mut ThemeTracker) -> Result<()> {
        for target in dom.query_selector_all(&self.target_selector)? {
            self.wrap(dom, tracker, target)?;
        }
        Ok(())
    }

    fn on_mutations(
        &mut self,
        dom: &mut Dom,
        tracker: &mut ThemeTracker,
        added: &[NodeId],
    ) -> Result<()> {
        for target in matching_in(dom, tracker, added, &self.target_selector)? {
            self.wrap(dom, tracker, target)?;
        }
        Ok(())
    }
}

/// Replaces inline SVG icons with themed images.
#[derive(Debug, Clone)]
pub struct IconLayer {
    pub selector: String,
    pub icon_src: String,
}

impl Default for IconLayer {
    fn default() -> Self {
        Self {
            selector: ".octicon-container".to_string(),
            icon_src: "theme-assets/shield.png".to_string(),
        }
    }
}

impl IconLayer {
    fn swap(&self, dom: &mut Dom, tracker: &mut ThemeTracker, host: NodeId) -> Result<()> {
        let icons: Vec<NodeId> = dom
            .element_children(host)
            .into_iter()
            .filter(|child| dom.tag_name(*child) == Some("svg"))
            .collect();
        if icons.is_empty() {
            return Ok(());
        }

        tracker.record_modification(dom, host, SnapshotOverrides::default())?;
        let icon_attr = tracker.config().icon_attr();
        for svg in icons {
            let img = dom.create_element("img");
            dom.set_attr(img, "src", &self.icon_src)?;
            dom.set_attr(img, "alt", "")?;
            dom.set_class_name(img, "theme-icon")?;
            dom.set_attr(img, &icon_attr, "true")?;
            tracker.record_creation(dom, img, "icon")?;
            dom.replace_child(host, img, svg)?;
        }
        Ok(())
    }
}

impl ThemeLayer for IconLayer {
    fn name(&self) -> &str {
        "icons"
    }

    fn apply(&mut self, dom: &mut Dom, tracker: &mut ThemeTracker) -> Result<()> {
        for host in dom.query_selector_all(&self.selector)? {
            self.swap(dom, tracker, host)?;
        }
        Ok(())
    }

    fn on_mutations(
        &mut self,
        dom: &mut Dom,
        tracker: &mut ThemeTracker,
        added: &[NodeId],
    ) -> Result<()> {
        for host in matching_in(dom, tracker, added, &self.selector)? {
            self.swap(dom, tracker, host)?;
        }
        Ok(())
    }
}
