//! Engine main loop, admission control, and worker pool (spec §4.3).
//!
//! The engine owns one global [`Dispatcher`], a configurable worker pool
//! that drains the deferred queue, a 1 Hz `engine.timer` tick, and the
//! call-accept state machine fed by `monitor.notify` events.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::handler::HandlerEntry;
use crate::message::Message;
use crate::plugin::PluginRegistry;
use crate::thread::ThreadRegistry;

/// Call-accept state, worst-first ordered (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AcceptState {
    Accept = 0,
    Congestion = 1,
    Restrict = 2,
    Reject = 3,
}

impl AcceptState {
    fn from_rank(rank: u8) -> Self {
        match rank {
            0 => AcceptState::Accept,
            1 => AcceptState::Congestion,
            2 => AcceptState::Restrict,
            _ => AcceptState::Reject,
        }
    }
}

/// Aggregates `monitor.notify` advertisements from every subsystem and
/// reports the worst currently-advertised state.
#[derive(Default)]
pub struct AdmissionControl {
    levels: DashMap<String, AcceptState>,
}

impl AdmissionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self, source: impl Into<String>, state: AcceptState) {
        self.levels.insert(source.into(), state);
    }

    pub fn clear(&self, source: &str) {
        self.levels.remove(source);
    }

    pub fn worst(&self) -> AcceptState {
        self.levels
            .iter()
            .map(|entry| *entry.value())
            .max()
            .unwrap_or(AcceptState::Accept)
    }

    /// Parses a `monitor.notify` message's `notify.N`/`value.N` pairs,
    /// recording each numbered monitor's advertised state.
    fn ingest(&self, msg: &Message) {
        let mut n = 0;
        loop {
            let name_key = format!("notify.{n}");
            let value_key = format!("value.{n}");
            let Some(name) = msg.get_param(&name_key) else {
                break;
            };
            let rank = msg.get_int_value(&value_key, 0).clamp(0, 3) as u8;
            self.notify(name.value().to_owned(), AcceptState::from_rank(rank));
            n += 1;
        }
    }
}

/// Owns the dispatcher, plugin registry, worker pool and admission state.
pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    plugins: Arc<PluginRegistry>,
    threads: Arc<ThreadRegistry>,
    admission: Arc<AdmissionControl>,
    config: parking_lot::Mutex<Option<Config>>,
    running: AtomicBool,
    worker_count: usize,
    accept_override: AtomicU8,
}

impl Engine {
    pub fn new(worker_count: usize) -> Arc<Self> {
        let engine = Arc::new(Self {
            dispatcher: Arc::new(Dispatcher::new()),
            plugins: Arc::new(PluginRegistry::new()),
            threads: Arc::new(ThreadRegistry::new()),
            admission: Arc::new(AdmissionControl::new()),
            config: parking_lot::Mutex::new(None),
            running: AtomicBool::new(false),
            worker_count: worker_count.max(1),
            accept_override: AtomicU8::new(u8::MAX),
        });
        let admission = Arc::clone(&engine.admission);
        engine.dispatcher.install(HandlerEntry::new(
            Some("monitor.notify"),
            0,
            Arc::new(move |msg: &mut Message| {
                admission.ingest(msg);
                true
            }),
        ));
        engine
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    pub fn admission(&self) -> &Arc<AdmissionControl> {
        &self.admission
    }

    pub fn load_config(&self, config: Config) {
        *self.config.lock() = Some(config);
    }

    /// Forces the accept state regardless of `monitor.notify` input
    /// (used by `engine.command restrict|reject|accept`).
    pub fn override_accept_state(&self, state: Option<AcceptState>) {
        self.accept_override
            .store(state.map(|s| s as u8).unwrap_or(u8::MAX), Ordering::SeqCst);
    }

    pub fn accept_state(&self) -> AcceptState {
        let forced = self.accept_override.load(Ordering::SeqCst);
        if forced != u8::MAX {
            AcceptState::from_rank(forced)
        } else {
            self.admission.worst()
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the worker pool and the 1 Hz timer, then dispatches
    /// `engine.start`.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        for i in 0..self.worker_count {
            let engine = Arc::clone(self);
            self.threads.spawn(format!("pbx-worker-{i}"), move |token| {
                while !token.is_cancelled() {
                    if !engine.dispatcher.dequeue_one() {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                }
            });
        }
        {
            let engine = Arc::clone(self);
            self.threads.spawn("pbx-timer", move |token| {
                let mut last = crate::time::now_us();
                while !token.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(50));
                    let now = crate::time::now_us();
                    if now - last >= 1_000_000 {
                        last = now;
                        let mut tick = Message::new("engine.timer");
                        tick.set_param("time", (now / 1_000_000).to_string());
                        engine.dispatcher.enqueue(tick);
                    }
                }
            });
        }
        self.dispatcher.dispatch(&mut Message::new("engine.start"));
    }

    /// Broadcasts `engine.halt`, unloads every plugin, and cancels worker
    /// threads. Returns the names of plugins that vetoed unload.
    pub fn stop(self: &Arc<Self>) -> Vec<String> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Vec::new();
        }
        let mut halt = Message::new("engine.halt");
        halt.set_broadcast(true);
        self.dispatcher.dispatch(&mut halt);
        let vetoed = self.plugins.unload_all(true);
        self.threads.killall(20);
        vetoed
    }

    /// Minimal CLI surface (spec §6): `status`, `help`, `reload`, `stop`.
    /// A real interactive shell is an external collaborator; this is the
    /// programmatic contract it would call into.
    pub fn handle_command(self: &Arc<Self>, line: &str) -> String {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        match parts.next().unwrap_or("") {
            "status" => format!(
                "accept={:?} handlers={} deferred={} plugins={}",
                self.accept_state(),
                self.dispatcher.handler_count(),
                self.dispatcher.deferred_len(),
                self.plugins.len()
            ),
            "help" => "status|help|reload|stop".to_owned(),
            "reload" => {
                self.plugins.reload_all();
                "reloaded".to_owned()
            }
            "stop" => {
                self.stop();
                "stopped".to_owned()
            }
            other => format!("unknown command: {other}"),
        }
    }
}
