//! Polling monitor: re-parses each session buffer on an interval and reports
//! state transitions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jat_markers::{Marker, SessionState, determine_session_state, parse_all_markers};
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::source::read_tail;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub path: PathBuf,
    /// `None` on the first successful read of a buffer.
    pub from: Option<SessionState>,
    pub to: SessionState,
    /// Offset of the latest marker in the parsed window.
    pub position: Option<usize>,
}

pub struct Watcher {
    paths: Vec<PathBuf>,
    window_bytes: usize,
    assigned_task: bool,
    last: HashMap<PathBuf, SessionState>,
}

impl Watcher {
    pub fn new(paths: Vec<PathBuf>, config: &MonitorConfig) -> Self {
        Self {
            paths,
            window_bytes: config.window_bytes,
            assigned_task: config.assigned_task,
            last: HashMap::new(),
        }
    }

    pub fn state_of(&self, path: &Path) -> Option<SessionState> {
        self.last.get(path).copied()
    }

    /// Re-reads the window of every buffer once. Unreadable buffers are
    /// skipped for this tick and keep their previous state.
    pub fn poll(&mut self) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for path in &self.paths {
            let buffer = match read_tail(path, self.window_bytes) {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!(path = %path.display(), "Skipping buffer: {:#}", e);
                    continue;
                }
            };

            let result = parse_all_markers(&buffer);
            let state = determine_session_state(&result, self.assigned_task);
            let previous = self.last.insert(path.clone(), state);

            if previous == Some(state) {
                continue;
            }
            debug!(path = %path.display(), ?previous, %state, "State changed");
            transitions.push(Transition {
                path: path.clone(),
                from: previous,
                to: state,
                position: result.latest().map(Marker::position),
            });
        }

        transitions
    }

    /// Polls until `max_ticks` is reached (forever when `None`), handing each
    /// transition to `on_transition`. A callback error stops the loop.
    pub fn run<F>(
        &mut self,
        interval: Duration,
        max_ticks: Option<u64>,
        mut on_transition: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(&Transition) -> anyhow::Result<()>,
    {
        let mut tick = 0u64;
        loop {
            for transition in self.poll() {
                on_transition(&transition)?;
            }
            tick += 1;
            if max_ticks.is_some_and(|max| tick >= max) {
                return Ok(());
            }
            std::thread::sleep(interval);
        }
    }
}
