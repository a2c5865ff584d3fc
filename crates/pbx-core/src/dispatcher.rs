//! The message bus: handler registry plus deferred queue (spec §3, §4.2
//! "Dispatcher").
//!
//! Grounded in `engine/Message.cpp`'s `MessageDispatcher`: handlers are
//! kept sorted by priority with install-order as the tie-break, traversal
//! stops at the first `true` return unless the message is broadcast, and
//! the deferred queue is a plain FIFO drained one message at a time by
//! [`Dispatcher::dequeue_one`].

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handler::HandlerEntry;
use crate::message::Message;

type PostHook = dyn Fn(&Message, bool) + Send + Sync;

/// Priority-ordered handler chain plus a FIFO of deferred messages.
pub struct Dispatcher {
    handlers: Mutex<Vec<Arc<HandlerEntry>>>,
    deferred: Mutex<VecDeque<Message>>,
    post_hook: Mutex<Option<Box<PostHook>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            deferred: Mutex::new(VecDeque::new()),
            post_hook: Mutex::new(None),
        }
    }

    pub fn set_post_hook(&self, hook: impl Fn(&Message, bool) + Send + Sync + 'static) {
        *self.post_hook.lock() = Some(Box::new(hook));
    }

    pub fn clear_post_hook(&self) {
        *self.post_hook.lock() = None;
    }

    /// Inserts `handler` in priority order (ties broken by install order).
    /// Fails if the same `Arc` pointer is already installed.
    pub fn install(&self, handler: Arc<HandlerEntry>) -> bool {
        let mut handlers = self.handlers.lock();
        if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        let pos = handlers
            .iter()
            .position(|h| h.priority() > handler.priority())
            .unwrap_or(handlers.len());
        handlers.insert(pos, handler);
        true
    }

    /// Idempotent: uninstalling a handler that is not installed is a no-op
    /// returning `false`.
    pub fn uninstall(&self, handler: &Arc<HandlerEntry>) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Dispatches `msg` synchronously on the calling thread. For a
    /// non-broadcast message, traversal stops at the first handler whose
    /// `received` returns `true`. For a broadcast message every matching
    /// handler runs and the final `handled` is the logical OR of all
    /// results.
    pub fn dispatch(&self, msg: &mut Message) -> bool {
        // Dispatch iterates a snapshot of the handler list, so a handler
        // installing or uninstalling itself (or a peer) mid-dispatch never
        // observes a torn list and never affects the message already in
        // flight (spec §4.2: "new state takes effect no earlier than the
        // next message").
        let snapshot: Vec<Arc<HandlerEntry>> = self.handlers.lock().clone();
        let broadcast = msg.broadcast();
        let mut handled = false;
        for entry in &snapshot {
            if !entry.matches(msg.name()) {
                continue;
            }
            let this_handled = entry.receiver.received(msg);
            if this_handled {
                handled = true;
                if !broadcast {
                    break;
                }
            }
        }
        msg.mark_dispatched();
        if let Some(hook) = self.post_hook.lock().as_ref() {
            hook(msg, handled);
        }
        handled
    }

    /// Enqueues `msg` for later dispatch by a worker pool. Returns `false`
    /// if a message carrying the same internal identity is already queued
    /// (guards against the pathological case of requeuing a message that
    /// escaped normal move-ownership tracking).
    pub fn enqueue(&self, msg: Message) -> bool {
        let mut deferred = self.deferred.lock();
        if deferred.iter().any(|m| m.internal_id() == msg.internal_id()) {
            return false;
        }
        deferred.push_back(msg);
        true
    }

    /// Pops and dispatches the head of the deferred queue, if any.
    pub fn dequeue_one(&self) -> bool {
        let Some(mut msg) = self.deferred.lock().pop_front() else {
            return false;
        };
        self.dispatch(&mut msg);
        true
    }

    /// Drains the deferred queue completely.
    pub fn dequeue_all(&self) {
        while self.dequeue_one() {}
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        order: Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
        returns: bool,
    }

    impl crate::handler::Handler for Recorder {
        fn received(&self, _msg: &mut Message) -> bool {
            self.order.lock().push(self.label);
            self.returns
        }
    }

    #[test]
    fn dispatch_ordering_stops_at_first_handled() {
        // Scenario 1 (spec §8).
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let h1 = HandlerEntry::new::<&str>(
            None,
            10,
            Arc::new(Recorder { order: order.clone(), label: "h1", returns: false }),
        );
        let h2 = HandlerEntry::new::<&str>(
            None,
            20,
            Arc::new(Recorder { order: order.clone(), label: "h2", returns: true }),
        );
        let h3 = HandlerEntry::new::<&str>(
            None,
            30,
            Arc::new(Recorder { order: order.clone(), label: "h3", returns: false }),
        );
        dispatcher.install(h1);
        dispatcher.install(h2);
        dispatcher.install(h3);

        let mut msg = Message::new("call.route");
        let handled = dispatcher.dispatch(&mut msg);
        assert!(handled);
        assert_eq!(*order.lock(), vec!["h1", "h2"]);
        assert!(msg.is_dispatched());
    }

    #[test]
    fn broadcast_runs_every_matching_handler() {
        // Scenario 2 (spec §8).
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, returns, prio) in [("h1", false, 10), ("h2", true, 20), ("h3", false, 30)] {
            dispatcher.install(HandlerEntry::new::<&str>(
                None,
                prio,
                Arc::new(Recorder { order: order.clone(), label, returns }),
            ));
        }
        let mut msg = Message::new("call.route");
        msg.set_broadcast(true);
        let handled = dispatcher.dispatch(&mut msg);
        assert!(handled);
        assert_eq!(*order.lock(), vec!["h1", "h2", "h3"]);
    }

    #[test]
    fn install_rejects_duplicate_pointer_uninstall_is_idempotent() {
        let dispatcher = Dispatcher::new();
        let handler = HandlerEntry::new::<&str>(None, 0, Arc::new(|_: &mut Message| true));
        assert!(dispatcher.install(handler.clone()));
        assert!(!dispatcher.install(handler.clone()));
        assert!(dispatcher.uninstall(&handler));
        assert!(!dispatcher.uninstall(&handler));
    }

    #[test]
    fn name_filter_only_matches_its_own_message() {
        let dispatcher = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        dispatcher.install(HandlerEntry::new(
            Some("call.route"),
            0,
            Arc::new(move |_: &mut Message| {
                count2.fetch_add(1, Ordering::SeqCst);
                true
            }),
        ));
        let mut other = Message::new("chan.hangup");
        dispatcher.dispatch(&mut other);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let mut route = Message::new("call.route");
        dispatcher.dispatch(&mut route);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enqueue_dispatch_is_fifo_per_producer() {
        let dispatcher = Dispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["a", "b", "c"] {
            let order2 = order.clone();
            dispatcher.install(HandlerEntry::new::<&str>(
                Some(label),
                0,
                Arc::new(move |_: &mut Message| {
                    order2.lock().push(label);
                    true
                }),
            ));
        }
        for label in ["a", "b", "c"] {
            dispatcher.enqueue(Message::new(label));
        }
        dispatcher.dequeue_all();
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }
}
