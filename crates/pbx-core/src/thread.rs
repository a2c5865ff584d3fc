//! Cooperative cancellation and a registry for the engine's worker threads
//! (spec §5 "Cancellation", §9 "Cooperative cancellation").
//!
//! The teacher's `spark-core` tests (`concurrency_primitives.rs`) exercise a
//! `Cancellation` primitive with parent/child tokens polled at suspension
//! points; this module follows the same shape instead of the original
//! engine's OS-level `pthread_cancel` plus cleanup callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;

/// A cancellation flag that can be shared with child tokens. Cancelling a
/// parent cancels every child; cancelling a child only affects that child
/// and its own descendants.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    children: parking_lot::Mutex<Vec<Arc<TokenInner>>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                children: parking_lot::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derives a child token. If `self` is already cancelled the child is
    /// created already-cancelled.
    pub fn child(&self) -> CancellationToken {
        let child_inner = Arc::new(TokenInner {
            cancelled: AtomicBool::new(self.is_cancelled()),
            children: parking_lot::Mutex::new(Vec::new()),
        });
        self.inner.children.lock().push(Arc::clone(&child_inner));
        CancellationToken { inner: child_inner }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancels this token and propagates to all descendants. Returns
    /// `true` the first time a given token transitions to cancelled.
    pub fn cancel(&self) -> bool {
        let newly = self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        for child in self.inner.children.lock().iter() {
            Self::cancel_inner(child);
        }
        newly
    }

    fn cancel_inner(inner: &Arc<TokenInner>) {
        inner.cancelled.store(true, Ordering::Release);
        for child in inner.children.lock().iter() {
            Self::cancel_inner(child);
        }
    }
}

/// Registers a named worker thread with the engine and tracks its
/// cancellation token, so the engine can attempt an orderly `killall` on
/// shutdown instead of reaching for `std::process::exit`.
#[derive(Default)]
pub struct ThreadRegistry {
    threads: DashMap<u64, Registered>,
    next_id: std::sync::atomic::AtomicU64,
}

struct Registered {
    name: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `body` on a new OS thread, handing it a child cancellation
    /// token it is expected to poll at its suspension points.
    pub fn spawn<F>(&self, name: impl Into<String>, body: F) -> CancellationToken
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let name = name.into();
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(worker_token))
            .expect("failed to spawn engine worker thread");
        self.threads.insert(
            id,
            Registered {
                name,
                token: token.clone(),
                handle: Some(handle),
            },
        );
        token
    }

    /// Cancels every registered thread and joins those that exit within
    /// `retries` short waits; threads still alive afterward are logged and
    /// left for process exit rather than forcibly killed.
    pub fn killall(&self, retries: u32) {
        for entry in self.threads.iter() {
            entry.value().token.cancel();
        }
        for mut entry in self.threads.iter_mut() {
            let mut attempt = 0;
            loop {
                let Some(handle) = entry.handle.take() else {
                    break;
                };
                if handle.is_finished() || attempt >= retries {
                    if !handle.is_finished() {
                        tracing::warn!(thread = %entry.name, "thread did not exit after killall retries");
                    }
                    let _ = handle.join();
                    break;
                }
                entry.handle = Some(handle);
                attempt += 1;
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
        self.threads.clear();
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
