//! Data and scroll reconciliation engine for a chat client's message pane.
//!
//! The actor in [`pane`] owns the selected conversation's [`History`] and
//! serializes pagination, live updates, content loading, and scroll
//! anchoring through one task. Shells plug in backend traits from
//! `colloquy_api` plus a [`ViewportSurface`], drive the pane through
//! [`PaneHandle`], and observe it through [`PaneEventSubscription`].

pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod history;
pub mod pagination;
pub mod pane;
pub mod registry;
pub mod scroll;
pub mod session;
pub mod test_utils;
pub mod viewport;

pub use config::PaneConfig;
pub use error::{Error, Result};
pub use events::{HistoryChangeReason, PaneEvent, PaneEventEnvelope, PaneEventSubscription};
pub use history::History;
pub use pane::{MessagePane, PaneDeps, PaneHandle, PaneState, PaneStatus};
pub use registry::{ChatDirectory, MessageIndex, UserDirectory};
pub use scroll::{ScrollBehavior, ScrollSnapshot};
pub use viewport::ViewportSurface;
