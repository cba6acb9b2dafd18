use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{FileFailurePersistence, TestCaseError, TestCaseResult};
use theme_tracker::{
    ContentSnapshot, Dom, NodeId, SnapshotOverrides, ThemeTracker, TrackedRecord, TrackerConfig,
};

const RESTORE_PROPTEST_REGRESSION_FILE: &str =
    "tests/proptest-regressions/restore_property_fuzz_test.txt";
const DEFAULT_RESTORE_PROPTEST_CASES: u32 = 128;

const PAGE_HTML: &str = r#"<html><head></head><body><main id="main"><div id="header" class="header" style="color: red;"><span id="logo" class="logo">Hub</span></div><div id="timeline" class="timeline"><p id="entry">First</p><p id="second">Second</p></div><ul id="list"><li id="a">A</li><li id="b" class="item">B</li><li id="c">C</li></ul></main></body></html>"#;

const POOL: [&str; 10] = [
    "main", "header", "logo", "timeline", "entry", "second", "list", "a", "b", "c",
];

#[derive(Clone, Debug)]
enum ThemeAction {
    Restyle(usize),
    Rewrite(usize, String),
    Hide(usize),
    Decorate(usize),
    Strip(usize),
    Restamp(usize),
    Move(usize, usize),
    Retire(usize),
    HostRemove(usize),
    HostInsert(usize),
    HostSetAttr(usize),
}

fn env_proptest_cases(var_name: &str, default_cases: u32) -> u32 {
    std::env::var(var_name)
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default_cases)
}

fn restore_proptest_cases() -> u32 {
    env_proptest_cases(
        "THEME_TRACKER_PROPTEST_CASES",
        DEFAULT_RESTORE_PROPTEST_CASES,
    )
}

fn text_strategy() -> BoxedStrategy<String> {
    vec(
        prop_oneof![
            Just('a'),
            Just('z'),
            Just('0'),
            Just(' '),
            Just('<'),
            Just('&'),
            Just('"'),
        ],
        0..=8,
    )
    .prop_map(|chars| chars.into_iter().collect())
    .boxed()
}

fn pool_index() -> BoxedStrategy<usize> {
    (0..POOL.len()).boxed()
}

fn cosmetic_action_strategy() -> BoxedStrategy<ThemeAction> {
    prop_oneof![
        4 => pool_index().prop_map(ThemeAction::Restyle),
        3 => (pool_index(), text_strategy()).prop_map(|(idx, text)| ThemeAction::Rewrite(idx, text)),
        2 => pool_index().prop_map(ThemeAction::Hide),
        2 => pool_index().prop_map(ThemeAction::Decorate),
        2 => pool_index().prop_map(ThemeAction::Strip),
        2 => pool_index().prop_map(ThemeAction::Restamp),
    ]
    .boxed()
}

/// Changes that leave every child list alone.
fn attribute_action_strategy() -> BoxedStrategy<ThemeAction> {
    prop_oneof![
        3 => pool_index().prop_map(ThemeAction::Restyle),
        2 => pool_index().prop_map(ThemeAction::Hide),
        2 => pool_index().prop_map(ThemeAction::Decorate),
        3 => pool_index().prop_map(ThemeAction::Strip),
        3 => pool_index().prop_map(ThemeAction::Restamp),
    ]
    .boxed()
}

fn any_action_strategy() -> BoxedStrategy<ThemeAction> {
    prop_oneof![
        6 => cosmetic_action_strategy(),
        3 => (pool_index(), pool_index()).prop_map(|(node, to)| ThemeAction::Move(node, to)),
        1 => pool_index().prop_map(ThemeAction::Retire),
        2 => pool_index().prop_map(ThemeAction::HostRemove),
        2 => pool_index().prop_map(ThemeAction::HostInsert),
        1 => pool_index().prop_map(ThemeAction::HostSetAttr),
    ]
    .boxed()
}

struct Fixture {
    dom: Dom,
    tracker: ThemeTracker,
    pool: Vec<NodeId>,
    created: Vec<NodeId>,
}

fn fail(err: theme_tracker::Error) -> TestCaseError {
    TestCaseError::fail(format!("{err:?}"))
}

fn fixture() -> Result<Fixture, TestCaseError> {
    let dom = Dom::from_html(PAGE_HTML).map_err(fail)?;
    let mut tracker = ThemeTracker::new(TrackerConfig::default()).map_err(fail)?;
    tracker.init();
    let pool = POOL
        .iter()
        .map(|id| {
            dom.by_id(id)
                .ok_or_else(|| TestCaseError::fail(format!("#{id} missing")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Fixture {
        dom,
        tracker,
        pool,
        created: Vec::new(),
    })
}

/// Theme actions record before they touch anything. Host actions never
/// record. DOM rejections (cycles, detached targets) are part of the
/// scenario and are ignored.
fn run_action(fx: &mut Fixture, action: &ThemeAction) -> theme_tracker::Result<()> {
    let Fixture {
        dom,
        tracker,
        pool,
        created,
    } = fx;
    match action {
        ThemeAction::Restyle(idx) => {
            let node = pool[*idx];
            tracker.record_modification(dom, node, SnapshotOverrides::default())?;
            dom.class_add(node, "theme-restyled")?;
            dom.style_set(node, "font-family", "Cinzel, serif")
        }
        ThemeAction::Rewrite(idx, text) => {
            let node = pool[*idx];
            tracker.record_modification(dom, node, SnapshotOverrides::default())?;
            dom.set_text_content(node, text)
        }
        ThemeAction::Hide(idx) => tracker.hide(dom, pool[*idx]).map(|_| ()),
        ThemeAction::Decorate(idx) => {
            let host = pool[*idx];
            tracker.record_modification(dom, host, SnapshotOverrides::default())?;
            let badge = dom.create_element("span");
            dom.set_class_name(badge, "theme-badge")?;
            tracker.record_creation(dom, badge, "badge")?;
            created.push(badge);
            dom.append_child(host, badge)
        }
        ThemeAction::Strip(idx) => {
            let node = pool[*idx];
            tracker.record_modification(dom, node, SnapshotOverrides::default())?;
            let host_attrs: Vec<String> = dom
                .attributes(node)
                .into_iter()
                .map(|(name, _)| name)
                .filter(|name| !name.starts_with("data-theme-"))
                .collect();
            host_attrs
                .iter()
                .try_for_each(|name| dom.remove_attr(node, name))
        }
        ThemeAction::Restamp(idx) => {
            let node = pool[*idx];
            tracker.record_modification(dom, node, SnapshotOverrides::default())?;
            dom.set_style_text(node, "")?;
            dom.style_set(node, "color", "gold")
        }
        ThemeAction::Move(idx, to) => {
            let node = pool[*idx];
            let target = pool[*to];
            let Some(from) = dom.parent(node) else {
                return Ok(());
            };
            tracker.record_move(dom, node, from, target)?;
            let _ = dom.append_child(target, node);
            Ok(())
        }
        ThemeAction::Retire(idx) => tracker.retire(dom, pool[*idx]).map(|_| ()),
        ThemeAction::HostRemove(idx) => dom.remove_node(pool[*idx]),
        ThemeAction::HostInsert(idx) => {
            let item = dom.create_element("em");
            dom.set_text_content(item, "host")?;
            dom.append_child(pool[*idx], item)
        }
        ThemeAction::HostSetAttr(idx) => dom.set_attr(pool[*idx], "data-host", "1"),
    }
}

/// Captured class, style and content of every modified node, as the
/// registry holds them right before restoration.
fn recorded_state(tracker: &ThemeTracker) -> Vec<(NodeId, String, String, Option<String>)> {
    tracker
        .registry()
        .modified()
        .filter_map(|record: &TrackedRecord| {
            let snapshot = record.snapshot()?;
            let content = match &snapshot.inner_content {
                ContentSnapshot::Captured(content) => Some(content.clone()),
                ContentSnapshot::Oversized => None,
            };
            Some((
                record.node(),
                snapshot.class_name.clone(),
                snapshot.style_text.clone(),
                content,
            ))
        })
        .collect()
}

/// Recorded nodes that restoration must leave in the document: those still
/// attached now whose content-carrying ancestors were all recorded before
/// them. An ancestor recorded later captured the node in its themed state
/// and may legitimately rebuild it.
fn expected_attached(
    dom: &Dom,
    recorded: &[(NodeId, String, String, Option<String>)],
) -> Vec<NodeId> {
    recorded
        .iter()
        .enumerate()
        .filter(|(_, (node, ..))| dom.is_connected(*node))
        .filter(|(pos, (node, ..))| {
            !recorded[pos + 1..].iter().any(|(later, _, _, content)| {
                content.is_some() && *later != *node && dom.contains(*later, *node)
            })
        })
        .map(|(_, (node, ..))| *node)
        .collect()
}

fn assert_cosmetic_round_trip(actions: &[ThemeAction]) -> TestCaseResult {
    let mut fx = fixture()?;
    for (step, action) in actions.iter().enumerate() {
        let outcome = run_action(&mut fx, action);
        prop_assert!(
            outcome.is_ok(),
            "cosmetic action failed at step {step}: {action:?}, error={outcome:?}"
        );
    }

    let recorded = recorded_state(&fx.tracker);
    let attached = expected_attached(&fx.dom, &recorded);
    let report = fx.tracker.restore_all(&mut fx.dom);
    prop_assert_eq!(report.failed, 0);

    for node in attached {
        prop_assert!(
            fx.dom.is_connected(node),
            "{:?} was detached by restoration, actions={:?}",
            node,
            actions
        );
    }

    for (node, class_name, style_text, content) in recorded {
        let live_class = fx.dom.attr(node, "class").unwrap_or_default().to_string();
        prop_assert_eq!(&live_class, &class_name, "class of {:?}, actions={:?}", node, actions);
        prop_assert_eq!(&fx.dom.style_text(node), &style_text, "style of {:?}", node);
        if let Some(content) = content {
            let live = fx.dom.inner_html(node).map_err(fail)?;
            prop_assert_eq!(&live, &content, "content of {:?}, actions={:?}", node, actions);
        }
    }
    for badge in &fx.created {
        prop_assert!(!fx.dom.is_connected(*badge), "badge {badge:?} still attached");
    }
    Ok(())
}

fn assert_cleanup_leaves_no_artifacts(actions: &[ThemeAction]) -> TestCaseResult {
    let mut fx = fixture()?;
    for action in actions {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_action(&mut fx, action)
        }));
        prop_assert!(outcome.is_ok(), "action panicked: {action:?}, actions={actions:?}");
    }

    fx.tracker.cleanup(&mut fx.dom);

    prop_assert!(!fx.tracker.is_active());
    prop_assert!(fx.tracker.registry().is_empty());
    for node in fx.dom.all_elements() {
        let leftovers: Vec<String> = fx
            .dom
            .attributes(node)
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| name.starts_with("data-theme-"))
            .collect();
        prop_assert!(
            leftovers.is_empty(),
            "{node:?} keeps {leftovers:?}, actions={actions:?}"
        );
        prop_assert!(
            !fx.dom.class_tokens(node).iter().any(|token| token.starts_with("theme-")),
            "{node:?} keeps a theme class, actions={actions:?}"
        );
    }
    for badge in &fx.created {
        prop_assert!(!fx.dom.is_connected(*badge), "badge {badge:?} still attached");
    }

    let settled = fx.dom.dump();
    let (restored, swept) = fx.tracker.cleanup(&mut fx.dom);
    prop_assert_eq!(restored.restored, 0);
    prop_assert_eq!(swept.total(), 0);
    prop_assert_eq!(fx.dom.dump(), settled);
    Ok(())
}

fn assert_attribute_churn_round_trip(actions: &[ThemeAction]) -> TestCaseResult {
    let mut fx = fixture()?;
    let original = fx.dom.dump();
    // Record the whole region up front, ancestors first, so every snapshot
    // holds the untouched page.
    for node in fx.pool.clone() {
        fx.tracker
            .record_modification(&mut fx.dom, node, SnapshotOverrides::default())
            .map_err(fail)?;
    }
    for (step, action) in actions.iter().enumerate() {
        let outcome = run_action(&mut fx, action);
        prop_assert!(
            outcome.is_ok(),
            "attribute action failed at step {step}: {action:?}, error={outcome:?}"
        );
    }

    let report = fx.tracker.restore_all(&mut fx.dom);

    prop_assert_eq!(report.failed, 0);
    for (node, id) in fx.pool.iter().zip(POOL) {
        prop_assert!(
            fx.dom.is_connected(*node),
            "#{} was detached, actions={:?}",
            id,
            actions
        );
    }
    prop_assert_eq!(fx.dom.dump(), original, "actions={:?}", actions);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: restore_proptest_cases(),
        failure_persistence: Some(Box::new(
            FileFailurePersistence::Direct(RESTORE_PROPTEST_REGRESSION_FILE),
        )),
        .. ProptestConfig::default()
    })]

    #[test]
    fn cosmetic_changes_restore_to_their_first_snapshot(
        actions in vec(cosmetic_action_strategy(), 1..=16)
    ) {
        assert_cosmetic_round_trip(&actions)?;
    }

    #[test]
    fn attribute_churn_keeps_every_node_attached(
        actions in vec(attribute_action_strategy(), 1..=16)
    ) {
        assert_attribute_churn_round_trip(&actions)?;
    }

    #[test]
    fn cleanup_removes_every_theme_artifact(
        actions in vec(any_action_strategy(), 1..=24)
    ) {
        assert_cleanup_leaves_no_artifacts(&actions)?;
    }
}
