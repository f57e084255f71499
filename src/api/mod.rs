//! REST Surface (spec.md §4.8; SPEC_FULL.md §3.10).

pub mod dto;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
