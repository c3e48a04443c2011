pub mod confirm;
pub mod control;
pub mod engine;
pub mod manager;
pub mod offload;
pub mod profile;
pub mod sim;
pub mod types;

pub use manager::{ManagerSettings, WifiManager};
pub use types::*;
