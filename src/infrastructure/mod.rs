//! Infrastructure: everything that talks to something outside the process —
//! the database, the in-process Cache/Bus, and the payment provider.

pub mod bus;
pub mod db;
pub mod provider;

pub use bus::{Bus, InProcessBus, LockGuard, SharedBus};
