//! Charging subsystem: the Lifecycle Engine, Command Router, OCPP Codec &
//! Dispatcher correlation tables, and the Station Registry (spec.md §4.1,
//! §4.3, §4.4, §4.5).

pub mod command_router;
pub mod commands;
pub mod dispatcher;
pub mod lifecycle;
pub mod reconciler;
pub mod registry;
pub mod topup;

pub use command_router::{CommandRouter, DeliveryOutcome};
pub use commands::{OutboundAction, RoutedCommand};
pub use dispatcher::{MalformedFrameTracker, OcppCallError, PendingCalls, StationConnection};
pub use lifecycle::ChargingLifecycleEngine;
pub use reconciler::Reconciler;
pub use registry::{CloseRequest, RegisterOutcome, StationRegistry};
pub use topup::TopUpService;
