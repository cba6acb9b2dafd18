use super::*;

mod config_parsing;
mod html_fragments;
mod identity_markers;
mod sweeping;

const PROFILE_HTML: &str = r#"<html><head><title>profile</title></head><body><main><div id="header" class="header" style="color: red;"><span class="header-logo">Logo</span></div><div id="timeline" class="js-profile-timeline-container"><p id="entry" class="entry">First</p></div><ul id="list"><li id="a">A</li><li id="b">B</li><li id="c">C</li></ul></main></body></html>"#;

fn profile_page() -> Result<Dom> {
    Dom::from_html(PROFILE_HTML)
}

fn active_tracker() -> Result<ThemeTracker> {
    let mut tracker = ThemeTracker::new(TrackerConfig::default())?;
    tracker.init();
    Ok(tracker)
}

fn find(dom: &Dom, selector: &str) -> Result<NodeId> {
    dom.query_selector(selector)?
        .ok_or_else(|| Error::Dom(format!("no element matches {selector}")))
}

#[test]
fn error_display_names_the_failing_layer() {
    assert_eq!(
        Error::UnsupportedSelector("a + b".into()).to_string(),
        "unsupported selector: a + b"
    );
    assert_eq!(
        Error::InvalidRecord("gone".into()).to_string(),
        "invalid record: gone"
    );
    assert_eq!(Error::Timer("late".into()).to_string(), "timer error: late");
}
