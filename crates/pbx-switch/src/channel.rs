//! `Channel` & `Driver` base classes (spec §3, §4.6): the bridge between a
//! call leg and the message bus.
//!
//! Grounded in the original's `Driver`/`Channel` pair and its
//! `MultiRouter`/`ChanAssistList` "message-relay" idiom: a component
//! registers one [`Handler`] per related message kind, all multiplexed
//! through a single numeric relay id so the bulk of the call-handling logic
//! lives in one `relay_received` method instead of N near-identical
//! closures. Per-channel state is keyed by `id`, matching spec §4.6.

use std::sync::Arc;

use dashmap::DashMap;
use pbx_core::dispatcher::Dispatcher;
use pbx_core::handler::{Handler, HandlerEntry};
use pbx_core::message::Message;
use pbx_core::plugin::Plugin;

use crate::call_endpoint::CallEndpoint;

/// One relay identifier per related message kind a driver cares about,
/// matching the original's `MultiRouter` enumeration (`Route`, `Execute`,
/// `Disconnected`, `Hangup`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relay {
    CallRoute,
    CallExecute,
    ChanDisconnected,
    ChanHangup,
}

/// A channel's relay implementation multiplexes on [`Relay`] rather than on
/// the raw message name, so one method handles every related message kind.
pub trait ChannelRelay: Send + Sync {
    fn relay_received(&self, relay: Relay, msg: &mut Message) -> bool;
}

struct RelayHandler {
    relay: Relay,
    owner: Arc<dyn ChannelRelay>,
}

impl Handler for RelayHandler {
    fn received(&self, msg: &mut Message) -> bool {
        self.owner.relay_received(self.relay, msg)
    }
}

/// One channel: a [`CallEndpoint`] plus the driver-assigned id it is keyed
/// by on the driver's channel table.
pub struct Channel {
    pub endpoint: Arc<CallEndpoint>,
    pub billid: String,
}

impl Channel {
    pub fn new(id: impl Into<String>, billid: impl Into<String>) -> Self {
        Self {
            endpoint: CallEndpoint::new(id),
            billid: billid.into(),
        }
    }

    pub fn id(&self) -> &str {
        self.endpoint.id()
    }
}

/// A plugin owning a set of [`Channel`]s addressable by the `callto` prefix
/// it registers (e.g. `park/`, `tone/`). Handles `call.execute` for its own
/// prefix and relays `call.route`/`chan.disconnected`/`chan.hangup` for
/// channels it owns, keyed by `id` (spec §4.6).
pub struct Driver {
    name: String,
    prefix: String,
    channels: DashMap<String, Arc<Channel>>,
}

impl Driver {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            prefix: prefix.into(),
            channels: DashMap::new(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `true` if `callto` names this driver (`prefix/rest`).
    pub fn owns_callto(&self, callto: &str) -> bool {
        callto
            .strip_prefix(&self.prefix)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }

    pub fn insert_channel(&self, channel: Arc<Channel>) {
        self.channels.insert(channel.id().to_owned(), channel);
    }

    pub fn remove_channel(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.remove(id).map(|(_, c)| c)
    }

    pub fn channel(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.get(id).map(|e| e.value().clone())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Installs this driver's `call.execute` handler plus its relays on
    /// `dispatcher`, at the given base priority.
    pub fn install(self: &Arc<Self>, dispatcher: &Dispatcher, priority: i32) {
        let execute_driver = self.clone();
        dispatcher.install(HandlerEntry::new(
            Some("call.execute"),
            priority,
            Arc::new(move |msg: &mut Message| {
                let callto = msg.get_value("callto", "").to_owned();
                if !execute_driver.owns_callto(&callto) {
                    return false;
                }
                execute_driver.relay_received(Relay::CallExecute, msg)
            }),
        ));
        for (name, relay) in [
            ("call.route", Relay::CallRoute),
            ("chan.disconnected", Relay::ChanDisconnected),
            ("chan.hangup", Relay::ChanHangup),
        ] {
            dispatcher.install(HandlerEntry::new(
                Some(name),
                priority,
                Arc::new(RelayHandler { relay, owner: self.clone() }) as Arc<dyn Handler>,
            ));
        }
    }

    /// Formats the driver's `status` response line (spec §6 "engine.status").
    pub fn status_detail(&self) -> String {
        format!("name={},prefix={},chans={}", self.name, self.prefix, self.channels.len())
    }
}

impl ChannelRelay for Driver {
    fn relay_received(&self, relay: Relay, msg: &mut Message) -> bool {
        match relay {
            Relay::CallExecute => {
                let id = msg.get_value("id", "").to_owned();
                if id.is_empty() || self.channels.contains_key(&id) {
                    return false;
                }
                let billid = msg.get_value("billid", &id).to_owned();
                self.insert_channel(Arc::new(Channel::new(id, billid)));
                true
            }
            Relay::ChanDisconnected | Relay::ChanHangup => {
                let id = msg.get_value("id", "");
                if !self.channels.contains_key(id) {
                    return false;
                }
                if relay == Relay::ChanHangup {
                    self.remove_channel(id);
                }
                true
            }
            Relay::CallRoute => false,
        }
    }
}

impl Plugin for Driver {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self) {}

    fn unload(&self, _now: bool) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owns_callto_requires_slash_after_prefix() {
        let driver = Driver::new("park", "park");
        assert!(driver.owns_callto("park/default"));
        assert!(!driver.owns_callto("parking/x"));
        assert!(!driver.owns_callto("tone/dial"));
    }

    #[test]
    fn call_execute_for_foreign_prefix_is_not_handled() {
        let driver = Driver::new("park", "park");
        let dispatcher = Dispatcher::new();
        driver.install(&dispatcher, 0);
        let mut msg = Message::new("call.execute");
        msg.set_param("callto", "tone/dial");
        msg.set_param("id", "chan/1");
        assert!(!dispatcher.dispatch(&mut msg));
        assert_eq!(driver.channel_count(), 0);
    }

    #[test]
    fn call_execute_for_own_prefix_creates_a_channel() {
        let driver = Driver::new("park", "park");
        let dispatcher = Dispatcher::new();
        driver.install(&dispatcher, 0);
        let mut msg = Message::new("call.execute");
        msg.set_param("callto", "park/default");
        msg.set_param("id", "chan/1");
        assert!(dispatcher.dispatch(&mut msg));
        assert_eq!(driver.channel_count(), 1);
        assert!(driver.channel("chan/1").is_some());
    }

    #[test]
    fn hangup_removes_the_channel_disconnected_does_not() {
        let driver = Driver::new("park", "park");
        let dispatcher = Dispatcher::new();
        driver.install(&dispatcher, 0);
        let mut execute = Message::new("call.execute");
        execute.set_param("callto", "park/default");
        execute.set_param("id", "chan/1");
        dispatcher.dispatch(&mut execute);

        let mut disconnected = Message::new("chan.disconnected");
        disconnected.set_param("id", "chan/1");
        assert!(dispatcher.dispatch(&mut disconnected));
        assert_eq!(driver.channel_count(), 1);

        let mut hangup = Message::new("chan.hangup");
        hangup.set_param("id", "chan/1");
        assert!(dispatcher.dispatch(&mut hangup));
        assert_eq!(driver.channel_count(), 0);
    }

    #[test]
    fn unload_vetoes_while_channels_remain() {
        let driver = Driver::new("park", "park");
        driver.insert_channel(Arc::new(Channel::new("chan/1", "chan/1")));
        assert!(!driver.unload(true));
        driver.remove_channel("chan/1");
        assert!(driver.unload(true));
    }
}
