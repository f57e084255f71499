//! OCPP 1.6-JSON session layer (spec.md §4.2; SPEC_FULL.md §3.6, §3.5) — the
//! per-station actor that owns one WebSocket connection end to end: codec,
//! inbound Action dispatch, outbound Call correlation, and the raw
//! `tokio-tungstenite` listener, grounded on the teacher's
//! `interfaces/ws/ocpp_server.rs`.

pub mod server;
pub mod session_handler;

pub use server::OcppServer;
pub use session_handler::SessionHandler;
