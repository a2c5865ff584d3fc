//! # pbx-switch
//!
//! Call/data graph built on `pbx-core`'s message bus: `CallEndpoint`/
//! `DataEndpoint`, `DataSource`/`DataConsumer`/`Translator`, the RTP
//! dejitter buffer, `Channel`/`Driver` base classes, and the signalling
//! engine shell. See `SPEC_FULL.md` at the workspace root for the full
//! contract.

pub mod call_endpoint;
pub mod channel;
pub mod data_endpoint;
pub mod dejitter;
pub mod error;
pub mod signalling;
pub mod translator;

pub mod prelude {
    pub use crate::call_endpoint::CallEndpoint;
    pub use crate::channel::{Channel, ChannelRelay, Driver, Relay};
    pub use crate::data_endpoint::{wire, DataConsumer, DataEndpoint, DataFlags, DataSource};
    pub use crate::dejitter::{Dejitter, Packet, ReceiveOutcome};
    pub use crate::error::{Result, SwitchError};
    pub use crate::signalling::{Direction, DumpedComponent, PduSink, TimerTickable, TimerWheel};
    pub use crate::translator::{Edge, TranslatorFactory, TranslatorRegistry};
}
