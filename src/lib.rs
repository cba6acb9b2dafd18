//! Reversible cosmetic theming for live documents.
//!
//! Every change a theme makes to a [`Dom`] is recorded first: nodes it
//! creates go into a creation pool, nodes it modifies get a one-time
//! snapshot of their pre-theme state. Disabling the theme replays those
//! records deepest-first, deletes what the theme created, and finishes with a
//! pattern-based sweep for artifacts whose live references were lost because
//! the host page replaced them in the meantime.
//!
//! ```
//! use theme_tracker::{Dom, SnapshotOverrides, ThemeTracker, TrackerConfig};
//!
//! let mut dom = Dom::from_html("<body><h1 class=\"title\">Hello</h1></body>")?;
//! let mut tracker = ThemeTracker::new(TrackerConfig::default())?;
//! tracker.init();
//!
//! let h1 = dom.query_selector("h1")?.expect("heading");
//! tracker.record_modification(&mut dom, h1, SnapshotOverrides::default())?;
//! dom.set_class_name(h1, "title theme-banner")?;
//! dom.set_inner_html(h1, "Hail")?;
//!
//! tracker.restore_all(&mut dom);
//! assert_eq!(dom.inner_html(h1)?, "Hello");
//! assert_eq!(dom.attr(h1, "class"), Some("title"));
//! # Ok::<(), theme_tracker::Error>(())
//! ```

use std::error::Error as StdError;
use std::fmt;

mod config;
mod dom;
mod html;
mod identity;
mod layers;
mod placeholder;
mod registry;
mod restore;
mod selector;
mod session;
mod snapshot;
mod sweep;
mod tracker;

pub use config::{SweepConfig, TrackerConfig};
pub use dom::{ClassValue, Dom, MutationKind, MutationRecord, Namespace, NodeId};
pub use identity::{RecordKind, TrackId, class_string};
pub use layers::{FrameLayer, HeaderLayer, IconLayer, ThemeLayer};
pub use registry::{RecordState, Registry, TrackedRecord, TrackingEntry, TrackingStatus};
pub use restore::{RestoreOutcome, RestoreReport};
pub use session::{DisableReport, PendingTask, ThemeSession};
pub use snapshot::{ContentSnapshot, Snapshot, SnapshotOverrides};
pub use sweep::SweepReport;
pub use tracker::ThemeTracker;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    Dom(String),
    UnsupportedSelector(String),
    InvalidRecord(String),
    Config(String),
    Timer(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::Dom(msg) => write!(f, "dom error: {msg}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::InvalidRecord(msg) => write!(f, "invalid record: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Timer(msg) => write!(f, "timer error: {msg}"),
        }
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests;
