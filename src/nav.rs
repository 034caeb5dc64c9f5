//! Navigation history stack
//!
//! An explicit, serializable back-stack of (screen, tab) frames, gated by the
//! session core: the stack holds only frames to *return to*, never the
//! current one, and it is cleared in full by the session manager on every
//! logout so no history survives across a security boundary.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level screens of the application shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Screen {
    Login,
    Dashboard,
    Transactions,
    Customers,
    Reports,
    Settings,
    Profile,
}

/// Tabs within a tabbed screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Tab {
    Overview,
    History,
    Alerts,
}

/// One point in navigation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// The screen to return to.
    pub screen: Screen,
    /// The tab within that screen, when it has tabs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab: Option<Tab>,
}

impl Frame {
    /// Frame for a screen without tabs.
    pub fn screen(screen: Screen) -> Self {
        Self { screen, tab: None }
    }

    /// Where back navigation lands when history is empty.
    pub fn default_frame() -> Self {
        Self::screen(Screen::Dashboard)
    }
}

/// What the platform back signal should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackAction {
    /// Navigate to this frame.
    Navigate(Frame),
    /// Already at the default frame with no history: hand control back to the
    /// platform so it can exit the app.
    ExitApp,
}

/// LIFO stack of frames to return to.
#[derive(Debug, Default)]
pub struct NavigationHistory {
    stack: Mutex<Vec<Frame>>,
}

impl NavigationHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the frame being navigated away from.
    pub fn push(&self, frame: Frame) {
        self.stack.lock().expect("nav stack poisoned").push(frame);
    }

    /// Pop the most recent frame, `None` when history is empty.
    pub fn pop(&self) -> Option<Frame> {
        self.stack.lock().expect("nav stack poisoned").pop()
    }

    /// Number of frames to return to.
    pub fn len(&self) -> usize {
        self.stack.lock().expect("nav stack poisoned").len()
    }

    /// Whether there is nothing to return to.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all history. Called by the session manager on logout and by
    /// explicit return-to-start actions; screen components never call this.
    pub fn clear(&self) {
        let mut stack = self.stack.lock().expect("nav stack poisoned");
        if !stack.is_empty() {
            debug!(depth = stack.len(), "clearing navigation history");
            stack.clear();
        }
    }

    /// Resolve the platform back signal against the current frame.
    pub fn back(&self, current: &Frame) -> BackAction {
        if let Some(frame) = self.pop() {
            return BackAction::Navigate(frame);
        }
        if *current == Frame::default_frame() {
            BackAction::ExitApp
        } else {
            BackAction::Navigate(Frame::default_frame())
        }
    }

    /// Snapshot for persistence.
    pub fn frames(&self) -> Vec<Frame> {
        self.stack.lock().expect("nav stack poisoned").clone()
    }

    /// Restore a persisted snapshot, replacing current history.
    pub fn restore(&self, frames: Vec<Frame>) {
        *self.stack.lock().expect("nav stack poisoned") = frames;
    }
}
