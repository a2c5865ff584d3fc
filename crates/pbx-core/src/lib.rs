//! # pbx-core
//!
//! Message-passing core of the PBX engine: a `NamedList`/`Message` payload
//! model, a priority-ordered `Dispatcher` with a deferred queue, the
//! `Engine` main loop and admission control, the plugin lifecycle, a
//! sectioned `Config` loader, and the recursive timed `Mutex` / cooperative
//! `CancellationToken` primitives everything else in the workspace is built
//! on. See `SPEC_FULL.md` at the workspace root for the full contract.

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handler;
pub mod message;
pub mod mutex;
pub mod named_list;
pub mod plugin;
pub mod thread;
pub mod time;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dispatcher::Dispatcher;
    pub use crate::engine::{AcceptState, AdmissionControl, Engine};
    pub use crate::error::{CoreError, Result};
    pub use crate::handler::{Handler, HandlerEntry};
    pub use crate::message::{msg_escape, msg_unescape, Message};
    pub use crate::mutex::Mutex;
    pub use crate::named_list::{NamedList, NamedString};
    pub use crate::plugin::{Plugin, PluginRegistry};
    pub use crate::thread::{CancellationToken, ThreadRegistry};
}
