use super::*;

const LEFTOVER_HTML: &str = r#"<html><body><main><div class="theme-frame-wrapper"><div class="js-pinned-items-reorder-container"><ol><li class="pinned-item-list-item">repo</li></ol></div><span>decor</span></div><p id="bio" class="bio theme-parchment" style="color: black; font-family: Cinzel, serif;">Bio</p><img class="theme-icon" data-theme-icon="true" src="shield.png"><div data-theme-placeholder="theme_p__1_aaaaaaaaaa"></div><span data-theme-created="true" data-theme-id="theme_span__1_bbbbbbbbbb">made</span><h2 data-theme-modified="true" data-theme-id="theme_h2__1_cccccccccc">Title</h2></main></body></html>"#;

#[test]
fn sweep_removes_leftovers_from_a_lost_session() -> Result<()> {
    let mut dom = Dom::from_html(LEFTOVER_HTML)?;
    let tracker = ThemeTracker::new(TrackerConfig::default())?;
    let main = find(&dom, "main")?;

    let report = tracker.sweep(&mut dom);

    assert_eq!(
        report,
        SweepReport {
            placeholders_removed: 1,
            rescued: 1,
            created_removed: 1,
            wrappers_removed: 1,
            icons_removed: 1,
            classes_stripped: 1,
            styles_stripped: 1,
            markers_stripped: 1,
            failed: 0,
        }
    );
    assert_eq!(
        dom.inner_html(main)?,
        concat!(
            r#"<p id="bio" class="bio" style="color: black;">Bio</p>"#,
            "<h2>Title</h2>",
            r#"<div class="js-pinned-items-reorder-container"><ol><li class="pinned-item-list-item">repo</li></ol></div>"#,
        )
    );
    Ok(())
}

#[test]
fn sweep_is_idempotent() -> Result<()> {
    let mut dom = Dom::from_html(LEFTOVER_HTML)?;
    let tracker = ThemeTracker::new(TrackerConfig::default())?;

    tracker.sweep(&mut dom);
    let after_first = dom.dump();
    let second = tracker.sweep(&mut dom);

    assert_eq!(second.total(), 0);
    assert_eq!(dom.dump(), after_first);
    Ok(())
}

#[test]
fn rescued_content_falls_back_to_body() -> Result<()> {
    let mut dom = Dom::from_html(
        r#"<html><body><section class="castle-container"><div data-testid="pinned-items"><a href="/r">r</a></div></section></body></html>"#,
    )?;
    let tracker = ThemeTracker::new(TrackerConfig::default())?;
    let body = find(&dom, "body")?;

    let report = tracker.sweep(&mut dom);

    assert_eq!(report.wrappers_removed, 1);
    assert_eq!(report.rescued, 1);
    assert_eq!(
        dom.inner_html(body)?,
        r#"<div data-testid="pinned-items"><a href="/r">r</a></div>"#
    );
    Ok(())
}

#[test]
fn tracked_nodes_are_left_to_restoration() -> Result<()> {
    let mut dom = profile_page()?;
    let mut tracker = active_tracker()?;
    let header = find(&dom, "#header")?;
    let main = find(&dom, "main")?;

    tracker.record_modification(&mut dom, header, SnapshotOverrides::default())?;
    dom.class_add(header, "theme-header")?;
    let wrapper = dom.create_element("div");
    dom.set_class_name(wrapper, "theme-frame-wrapper")?;
    dom.append_child(main, wrapper)?;
    tracker.record_creation(&mut dom, wrapper, "frame wrapper")?;

    let report = tracker.sweep(&mut dom);

    assert_eq!(report.total(), 0);
    assert!(dom.is_connected(wrapper));
    assert!(dom.class_contains(header, "theme-header"));
    assert!(dom.has_attr(header, "data-theme-modified"));
    Ok(())
}

#[test]
fn cleanup_sweeps_after_restoring() -> Result<()> {
    let mut dom = profile_page()?;
    let original = dom.dump();
    let mut tracker = active_tracker()?;
    let header = find(&dom, "#header")?;
    let main = find(&dom, "main")?;

    tracker.record_modification(&mut dom, header, SnapshotOverrides::default())?;
    dom.class_add(header, "theme-header")?;
    // Added behind the tracker's back.
    let stray = dom.create_element("div");
    dom.set_class_name(stray, "theme-avatar-container")?;
    dom.append_child(main, stray)?;

    let (restored, swept) = tracker.cleanup(&mut dom);

    assert_eq!(restored.restored, 1);
    assert_eq!(swept.wrappers_removed, 1);
    assert_eq!(dom.dump(), original);
    Ok(())
}

#[test]
fn a_bad_selector_does_not_stop_the_sweep() -> Result<()> {
    let mut dom = Dom::from_html(r#"<div class="theme-frame-wrapper">x</div>"#)?;
    let mut config = TrackerConfig::default();
    config.sweep.wrapper_selectors = vec!["a + b".to_string(), ".theme-frame-wrapper".to_string()];
    let tracker = ThemeTracker::new(config)?;

    let report = tracker.sweep(&mut dom);

    assert_eq!(report.failed, 1);
    assert_eq!(report.wrappers_removed, 1);
    assert_eq!(dom.dump(), "");
    Ok(())
}

#[test]
fn classes_and_styles_outside_the_vocabulary_survive() -> Result<()> {
    let mut dom = Dom::from_html(
        r#"<p class="themes castle-gate" style="font-family: Inter; background: url(theme-assets/bg.png); filter: sepia(0.4);">x</p>"#,
    )?;
    let tracker = ThemeTracker::new(TrackerConfig::default())?;
    let p = find(&dom, "p")?;

    tracker.sweep(&mut dom);

    assert_eq!(dom.attr(p, "class"), Some("themes"));
    assert_eq!(dom.style_text(p), "font-family: Inter;");
    Ok(())
}
