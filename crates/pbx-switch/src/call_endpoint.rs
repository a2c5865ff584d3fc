//! `CallEndpoint`: the peerable half of a call, owning per-media
//! [`DataEndpoint`]s (spec §3 "CallEndpoint", §4.4 "connect/disconnect").
//!
//! A peer link is a non-owning `Weak` reference in each direction, same as
//! the teacher's channel-pairing pattern (`spark-switch::bridge`) and the
//! original's `CallEndpoint::setPeer`: two endpoints that strongly owned
//! each other could never be dropped.

use std::sync::{Arc, RwLock, Weak};

use dashmap::DashMap;
use pbx_core::dispatcher::Dispatcher;
use pbx_core::message::Message;

use crate::data_endpoint::{self, DataEndpoint};
use crate::error::SwitchError;
use crate::translator::TranslatorRegistry;

/// One side of a call, addressable by `id` and holding one [`DataEndpoint`]
/// per media type (`"audio"`, `"video"`, ...).
pub struct CallEndpoint {
    id: String,
    peer: RwLock<Weak<CallEndpoint>>,
    media: DashMap<String, Arc<DataEndpoint>>,
}

impl CallEndpoint {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            peer: RwLock::new(Weak::new()),
            media: DashMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> Option<Arc<CallEndpoint>> {
        self.peer.read().unwrap().upgrade()
    }

    pub fn is_peered(&self) -> bool {
        self.peer().is_some()
    }

    /// Gets or creates the [`DataEndpoint`] for `media` on this call leg.
    pub fn endpoint(&self, media: &str) -> Arc<DataEndpoint> {
        self.media
            .entry(media.to_owned())
            .or_insert_with(|| DataEndpoint::new(media))
            .clone()
    }

    pub fn media_names(&self) -> Vec<String> {
        self.media.iter().map(|e| e.key().clone()).collect()
    }

    /// Peers `self` with `other`, wiring each shared media name's
    /// `DataEndpoint`s in both directions. Already being peered to `other`
    /// is a no-op (spec §4.4 step 1). Any existing peer on either side is
    /// otherwise disconnected first: connecting to a new peer always breaks
    /// the old link, there is no three-way bridge.
    pub fn connect(
        self: &Arc<Self>,
        other: &Arc<CallEndpoint>,
        reason: &str,
        dispatcher: &Dispatcher,
        registry: &TranslatorRegistry,
    ) -> Result<(), SwitchError> {
        if Arc::ptr_eq(self, other) {
            return Err(SwitchError::AlreadyPeered { id: self.id.clone() });
        }
        if self.peer().map(|p| Arc::ptr_eq(&p, other)).unwrap_or(false) {
            return Ok(());
        }
        self.disconnect(reason, dispatcher);
        other.disconnect(reason, dispatcher);

        *self.peer.write().unwrap() = Arc::downgrade(other);
        *other.peer.write().unwrap() = Arc::downgrade(self);

        for media in self.media_names() {
            if let Some(peer_endpoint) = other.media.get(&media) {
                let mine = self.endpoint(&media);
                data_endpoint::wire(&mine, &peer_endpoint, registry)?;
                data_endpoint::wire(&peer_endpoint, &mine, registry)?;
            }
        }
        Ok(())
    }

    /// Tears down the peer link, if any, emitting `chan.disconnected` then
    /// `chan.hangup` (spec §8 Scenario 7). A no-op if not peered.
    pub fn disconnect(&self, reason: &str, dispatcher: &Dispatcher) {
        let Some(peer) = self.peer().clone() else {
            return;
        };
        *self.peer.write().unwrap() = Weak::new();
        *peer.peer.write().unwrap() = Weak::new();

        for endpoint in self.media.iter() {
            endpoint.set_source(None);
            endpoint.set_consumer(None);
        }
        for endpoint in peer.media.iter() {
            endpoint.set_source(None);
            endpoint.set_consumer(None);
        }

        let mut disconnected = Message::new("chan.disconnected");
        disconnected.set_param("id", self.id.clone());
        disconnected.set_param("reason", reason.to_owned());
        dispatcher.dispatch(&mut disconnected);

        let mut hangup = Message::new("chan.hangup");
        hangup.set_param("id", self.id.clone());
        hangup.set_param("reason", reason.to_owned());
        dispatcher.dispatch(&mut hangup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorded_names(dispatcher: &Dispatcher) -> Arc<StdMutex<Vec<String>>> {
        let names = Arc::new(StdMutex::new(Vec::new()));
        let names2 = names.clone();
        dispatcher.set_post_hook(move |msg: &Message, _handled| {
            names2.lock().unwrap().push(msg.name().to_owned());
        });
        names
    }

    #[test]
    fn connect_wires_shared_media_both_ways() {
        let a = CallEndpoint::new("a");
        let b = CallEndpoint::new("b");
        a.endpoint("audio");
        b.endpoint("audio");
        let dispatcher = Dispatcher::new();
        let registry = TranslatorRegistry::new();
        a.connect(&b, "answered", &dispatcher, &registry).unwrap();
        assert!(a.is_peered());
        assert!(b.is_peered());
        assert_eq!(a.peer().unwrap().id(), "b");
        assert_eq!(b.peer().unwrap().id(), "a");
    }

    #[test]
    fn connect_to_current_peer_is_a_no_op() {
        let a = CallEndpoint::new("a");
        let b = CallEndpoint::new("b");
        let dispatcher = Dispatcher::new();
        let registry = TranslatorRegistry::new();
        a.connect(&b, "answered", &dispatcher, &registry).unwrap();
        let names = recorded_names(&dispatcher);
        a.connect(&b, "answered-again", &dispatcher, &registry).unwrap();
        assert!(names.lock().unwrap().is_empty(), "no-op reconnect must not emit lifecycle messages");
        assert_eq!(a.peer().unwrap().id(), "b");
    }

    #[test]
    fn connect_disconnects_existing_peers_first() {
        let a = CallEndpoint::new("a");
        let b = CallEndpoint::new("b");
        let c = CallEndpoint::new("c");
        let dispatcher = Dispatcher::new();
        let registry = TranslatorRegistry::new();
        a.connect(&b, "r1", &dispatcher, &registry).unwrap();
        a.connect(&c, "r2", &dispatcher, &registry).unwrap();
        assert!(!b.is_peered());
        assert_eq!(a.peer().unwrap().id(), "c");
    }

    #[test]
    fn disconnect_emits_disconnected_then_hangup() {
        // Scenario 7 (spec §8).
        let a = CallEndpoint::new("a");
        let b = CallEndpoint::new("b");
        let dispatcher = Dispatcher::new();
        let registry = TranslatorRegistry::new();
        a.connect(&b, "answered", &dispatcher, &registry).unwrap();
        let names = recorded_names(&dispatcher);
        a.disconnect("hangup", &dispatcher);
        let names = names.lock().unwrap();
        assert_eq!(*names, vec!["chan.disconnected", "chan.hangup"]);
    }

    #[test]
    fn connecting_endpoint_to_itself_is_rejected() {
        let a = CallEndpoint::new("a");
        let dispatcher = Dispatcher::new();
        let registry = TranslatorRegistry::new();
        let err = a.connect(&a, "r", &dispatcher, &registry).unwrap_err();
        assert!(matches!(err, SwitchError::AlreadyPeered { .. }));
    }
}
