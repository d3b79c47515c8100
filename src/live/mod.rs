//! Project-scoped live update channel.
//!
//! - [`protocol`]: the closed set of push events and their JSON shape
//! - [`registry`]: subscribe/unsubscribe fan-out and source lifecycle
//! - [`source`]: the pluggable producer behind each channel
//! - [`simulation`]: the synthetic producer used in place of a real backend
//! - `remote`: a producer fed by a backend's WebSocket push endpoint

pub mod protocol;
pub mod registry;
#[cfg(feature = "client")]
pub mod remote;
pub mod simulation;
pub mod source;

pub use protocol::{AgentLog, AgentUpdate, ChannelEvent, GraphUpdate};
pub use registry::{ChannelRegistry, EventSink, Subscription};
#[cfg(feature = "client")]
pub use remote::RemoteSource;
pub use simulation::{SimulatedSource, Simulation, SimulationConfig};
pub use source::{EventSource, SourceCommand, SourceHandle};
