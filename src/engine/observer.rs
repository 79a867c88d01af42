//! Hooks invoked on every tracker mutation and sample emission.

use std::cell::RefCell;

use tracing::{info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    Refactoring,
    Stability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent<'a> {
    Created {
        path: &'a str,
        commit_id: &'a str,
    },
    Recorded {
        path: &'a str,
        commit_id: &'a str,
        commit_count: u64,
        consecutive_counter: u64,
    },
    Renamed {
        from: &'a str,
        to: &'a str,
        commit_id: &'a str,
        /// False when the source path had no tracker to carry over
        carried: bool,
    },
    Removed {
        path: &'a str,
        commit_id: &'a str,
    },
    Reset {
        path: &'a str,
        commit_id: &'a str,
        cause: ResetCause,
        refactorings_involved: u64,
    },
    RefactoringSampled {
        path: &'a str,
        commit_id: &'a str,
        refactoring_type: &'a str,
        tracked: bool,
    },
    StableSampled {
        path: &'a str,
        commit_id: &'a str,
        baseline_commit_id: &'a str,
        samples: usize,
    },
    SourceUnavailable {
        path: &'a str,
        baseline_commit_id: &'a str,
    },
}

impl TrackerEvent<'_> {
    /// Whether the event concerns `path` (either side of a rename).
    pub fn touches(&self, path: &str) -> bool {
        match self {
            Self::Renamed { from, to, .. } => *from == path || *to == path,
            Self::Created { path: p, .. }
            | Self::Recorded { path: p, .. }
            | Self::Removed { path: p, .. }
            | Self::Reset { path: p, .. }
            | Self::RefactoringSampled { path: p, .. }
            | Self::StableSampled { path: p, .. }
            | Self::SourceUnavailable { path: p, .. } => *p == path,
        }
    }
}

pub trait TrackerObserver {
    fn on_event(&self, event: &TrackerEvent<'_>);
}

/// Default observer: every event at trace level.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl TrackerObserver for TracingObserver {
    fn on_event(&self, event: &TrackerEvent<'_>) {
        trace!(?event, "tracker event");
    }
}

/// Logs the full history of one file at info level, following its renames.
#[derive(Debug)]
pub struct WatchObserver {
    path: RefCell<String>,
}

impl WatchObserver {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: RefCell::new(path.into()),
        }
    }

    pub fn current_path(&self) -> String {
        self.path.borrow().clone()
    }
}

impl TrackerObserver for WatchObserver {
    fn on_event(&self, event: &TrackerEvent<'_>) {
        let watched = self.path.borrow().clone();
        if !event.touches(&watched) {
            return;
        }
        info!(watched = %watched, ?event, "[WATCH] tracker event");
        if let TrackerEvent::Renamed { from, to, .. } = event
            && *from == watched
        {
            *self.path.borrow_mut() = (*to).to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touches_matches_either_rename_side() {
        let event = TrackerEvent::Renamed {
            from: "a/A.java",
            to: "b/A.java",
            commit_id: "c",
            carried: true,
        };
        assert!(event.touches("a/A.java"));
        assert!(event.touches("b/A.java"));
        assert!(!event.touches("c/A.java"));
    }

    #[test]
    fn watch_follows_renames() {
        let watch = WatchObserver::new("a/A.java");
        watch.on_event(&TrackerEvent::Renamed {
            from: "a/A.java",
            to: "b/A.java",
            commit_id: "c1",
            carried: true,
        });
        assert_eq!(watch.current_path(), "b/A.java");

        watch.on_event(&TrackerEvent::Renamed {
            from: "x/X.java",
            to: "y/Y.java",
            commit_id: "c2",
            carried: true,
        });
        assert_eq!(watch.current_path(), "b/A.java");
    }
}
