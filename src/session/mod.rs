//! Sensor session core
//!
//! - [`state_machine`] - pure connection transitions
//! - [`window`] - trailing window of recent values
//! - [`snapshot`] - the observable snapshot and its reducer
//! - [`store`] - watch-channel store consumers subscribe to
//! - [`manager`] - the session manager and its worker task

pub mod manager;
pub mod snapshot;
pub mod state_machine;
pub mod store;
pub mod window;

pub use manager::SessionManager;
pub use snapshot::{SessionSnapshot, SessionUpdate};
pub use state_machine::{ConnectionEvent, ConnectionState, StateMachine};
pub use store::StateStore;
pub use window::{TrailingWindow, TRAILING_WINDOW_CAPACITY};
