use serde::Serialize;

use crate::config::TrackerConfig;
use crate::dom::{Dom, MutationKind, NodeId};
use crate::layers::ThemeLayer;
use crate::restore::RestoreReport;
use crate::sweep::SweepReport;
use crate::tracker::ThemeTracker;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DisableReport {
    pub was_enabled: bool,
    pub restore: RestoreReport,
    pub sweep: SweepReport,
    pub stylesheet_removed: bool,
    pub recheck_scheduled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub id: i64,
    pub due_at: i64,
    pub order: i64,
}

/// A node the theme touched, with the inline styles that decided its
/// visibility before the theme did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchedNode {
    pub(crate) node: NodeId,
    pub(crate) display: Option<String>,
    pub(crate) visibility: Option<String>,
    pub(crate) opacity: Option<String>,
}

#[derive(Debug, Clone)]
enum SessionTask {
    VisibilityRecheck(Vec<WatchedNode>),
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    id: i64,
    due_at: i64,
    order: i64,
    task: SessionTask,
}

/// Turns a theme on and off over a live document.
///
/// Owns the tracker and the presentation layers, injects the theme
/// stylesheet, forwards host insertions to the layers while enabled, and
/// runs deferred work on a virtual clock advanced by the caller.
pub struct ThemeSession {
    tracker: ThemeTracker,
    layers: Vec<Box<dyn ThemeLayer>>,
    enabled: bool,
    stylesheet: Option<NodeId>,
    now_ms: i64,
    next_task_id: i64,
    next_order: i64,
    task_queue: Vec<ScheduledTask>,
}

impl ThemeSession {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        Ok(Self {
            tracker: ThemeTracker::new(config)?,
            layers: Vec::new(),
            enabled: false,
            stylesheet: None,
            now_ms: 0,
            next_task_id: 1,
            next_order: 0,
            task_queue: Vec::new(),
        })
    }

    pub fn with_layer(mut self, layer: impl ThemeLayer + 'static) -> Self {
        self.add_layer(Box::new(layer));
        self
    }

    pub fn add_layer(&mut self, layer: Box<dyn ThemeLayer>) {
        self.layers.push(layer);
    }

    pub fn tracker(&self) -> &ThemeTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ThemeTracker {
        &mut self.tracker
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    /// Applies the theme. Does nothing if it is already on.
    pub fn enable_theme(&mut self, dom: &mut Dom) -> Result<()> {
        if self.enabled {
            log::debug!("theme already enabled");
            return Ok(());
        }

        self.task_queue.clear();
        self.tracker.init();
        self.inject_stylesheet(dom)?;

        for layer in &mut self.layers {
            if let Err(err) = layer.apply(dom, &mut self.tracker) {
                log::warn!("layer `{}` failed to apply: {err}", layer.name());
            }
        }

        dom.observe(true);
        dom.take_mutation_records();
        self.enabled = true;
        log::info!(
            "theme enabled with {} layer(s), {} record(s)",
            self.layers.len(),
            self.tracker.registry().len()
        );
        Ok(())
    }

    fn inject_stylesheet(&mut self, dom: &mut Dom) -> Result<()> {
        let config = self.tracker.config();
        if let Some(existing) = dom.by_id(&config.stylesheet_id) {
            log::debug!("stylesheet `{}` already present", config.stylesheet_id);
            self.stylesheet = Some(existing);
            return Ok(());
        }

        let link = dom.create_element("link");
        dom.set_attr(link, "id", &config.stylesheet_id)?;
        dom.set_attr(link, "rel", "stylesheet")?;
        dom.set_attr(link, "href", &config.stylesheet_href)?;
        let parent = dom.head().or_else(|| dom.body()).unwrap_or(dom.root());
        self.tracker.record_creation(dom, link, "stylesheet")?;
        dom.append_child(parent, link)?;
        self.stylesheet = Some(link);
        Ok(())
    }

    /// Undoes the theme: restoration, then the sweep, then the stylesheet.
    /// Safe to call when already disabled.
    pub fn disable_theme(&mut self, dom: &mut Dom) -> DisableReport {
        let was_enabled = self.enabled;
        self.tracker.set_restoring(true);

        let watchlist = self.tracker.visibility_watchlist();
        let restore = self.tracker.restore_all(dom);
        let sweep = self.tracker.sweep(dom);

        let mut stylesheet_removed = self
            .stylesheet
            .take()
            .is_some_and(|link| !dom.is_connected(link));
        if let Some(link) = dom.by_id(&self.tracker.config().stylesheet_id) {
            match dom.remove_node(link) {
                Ok(()) => stylesheet_removed = true,
                Err(err) => log::warn!("could not remove stylesheet: {err}"),
            }
        }

        // Restoration's own mutations must not reach the layers.
        dom.take_mutation_records();
        dom.observe(false);
        self.tracker.set_restoring(false);

        let recheck_scheduled = !watchlist.is_empty();
        if recheck_scheduled {
            let delay = self.tracker.config().recheck_delay_ms;
            self.schedule(delay, SessionTask::VisibilityRecheck(watchlist));
        }

        self.enabled = false;
        if was_enabled {
            log::info!("theme disabled");
        }
        DisableReport {
            was_enabled,
            restore,
            sweep,
            stylesheet_removed,
            recheck_scheduled,
        }
    }

    /// Forwards host insertions since the last pump to every layer. Returns
    /// how many elements were forwarded.
    pub fn pump_mutations(&mut self, dom: &mut Dom) -> usize {
        let records = dom.take_mutation_records();
        if !self.enabled || self.tracker.is_restoring() {
            return 0;
        }

        let placeholder_attr = self.tracker.config().placeholder_attr();
        let mut added: Vec<NodeId> = Vec::new();
        for record in records {
            let MutationKind::ChildList { added: nodes, .. } = record.kind else {
                continue;
            };
            for node in nodes {
                if dom.is_element(node)
                    && dom.is_connected(node)
                    && self.tracker.id_of(node).is_none()
                    && !dom.has_attr(node, &placeholder_attr)
                    && !added.contains(&node)
                {
                    added.push(node);
                }
            }
        }
        if added.is_empty() {
            return 0;
        }

        for layer in &mut self.layers {
            if let Err(err) = layer.on_mutations(dom, &mut self.tracker, &added) {
                log::warn!("layer `{}` failed on inserted content: {err}", layer.name());
            }
        }
        // Drop what the layers just did so it is not fed back to them.
        dom.take_mutation_records();
        log::debug!("forwarded {} inserted element(s)", added.len());
        added.len()
    }

    fn schedule(&mut self, delay_ms: i64, task: SessionTask) -> i64 {
        let id = self.next_task_id;
        self.next_task_id += 1;
        let order = self.next_order;
        self.next_order += 1;
        self.task_queue.push(ScheduledTask {
            id,
            due_at: self.now_ms.saturating_add(delay_ms.max(0)),
            order,
            task,
        });
        id
    }

    pub fn pending_tasks(&self) -> Vec<PendingTask> {
        let mut tasks: Vec<PendingTask> = self
            .task_queue
            .iter()
            .map(|task| PendingTask {
                id: task.id,
                due_at: task.due_at,
                order: task.order,
            })
            .collect();
        tasks.sort_by_key(|task| (task.due_at, task.order));
        tasks
    }

    pub fn advance_time(&mut self, dom: &mut Dom, delta_ms: i64) -> Result<usize> {
        if delta_ms < 0 {
            return Err(Error::Timer(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        self.now_ms = self.now_ms.saturating_add(delta_ms);
        Ok(self.run_due_tasks(dom))
    }

    pub fn run_due_tasks(&mut self, dom: &mut Dom) -> usize {
        let mut ran = 0usize;
        while let Some(next_idx) = self.next_task_index(Some(self.now_ms)) {
            let task = self.task_queue.remove(next_idx);
            self.execute_task(dom, task);
            ran += 1;
        }
        ran
    }

    fn next_task_index(&self, due_limit: Option<i64>) -> Option<usize> {
        self.task_queue
            .iter()
            .enumerate()
            .filter(|(_, task)| due_limit.is_none_or(|limit| task.due_at <= limit))
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)
    }

    fn execute_task(&mut self, dom: &mut Dom, task: ScheduledTask) {
        match task.task {
            SessionTask::VisibilityRecheck(watchlist) => {
                let repaired = recheck_visibility(dom, &watchlist);
                log::debug!(
                    "visibility re-check {} at {}ms repaired {repaired} node(s)",
                    task.id,
                    self.now_ms
                );
            }
        }
    }
}

/// Undoes a hiding inline style (`display: none`, `visibility: hidden` or
/// a zero `opacity`) on nodes that were visible before the theme touched
/// them. Returns how many nodes changed.
fn recheck_visibility(dom: &mut Dom, watchlist: &[WatchedNode]) -> usize {
    let mut repaired = 0usize;
    for watched in watchlist {
        let node = watched.node;
        if !dom.is_connected(node) {
            continue;
        }
        let checks: [(&str, Option<&str>, fn(&str) -> bool); 3] = [
            ("display", watched.display.as_deref(), is_display_none),
            ("visibility", watched.visibility.as_deref(), is_visibility_hidden),
            ("opacity", watched.opacity.as_deref(), is_fully_transparent),
        ];
        let mut fixed = false;
        for (property, prior, hides) in checks {
            let Some(current) = dom.style_get(node, property) else {
                continue;
            };
            if !hides(&current) || prior.is_some_and(hides) {
                continue;
            }
            match dom.style_set(node, property, prior.unwrap_or_default()) {
                Ok(()) => fixed = true,
                Err(err) => log::warn!("re-check could not reset {property} on {node:?}: {err}"),
            }
        }
        if fixed {
            log::info!("re-check made {node:?} visible again");
            repaired += 1;
        }
    }
    repaired
}

fn is_display_none(value: &str) -> bool {
    value.eq_ignore_ascii_case("none")
}

fn is_visibility_hidden(value: &str) -> bool {
    value.eq_ignore_ascii_case("hidden")
}

fn is_fully_transparent(value: &str) -> bool {
    let value = value.trim();
    match value.strip_suffix('%') {
        Some(percent) => percent.trim().parse::<f64>().is_ok_and(|p| p <= 0.0),
        None => value.parse::<f64>().is_ok_and(|v| v <= 0.0),
    }
}
