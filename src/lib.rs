//! Connection-lifecycle orchestration for a WiFi interface driven by a
//! wpa_supplicant-style engine.
//!
//! [`WifiManager`] is the entry point: it turns connect / disconnect / AP
//! requests into engine commands, tracks the single outstanding operation
//! and reports asynchronous outcomes on an [`EventBus`].

pub mod config;
pub mod error;
pub mod event;
pub mod network;

pub use error::{WpasError, WpasResult};
pub use event::{EventBus, MgmtEvent, Notification, Outcome};
pub use network::{ManagerSettings, WifiManager};
