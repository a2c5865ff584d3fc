//! Plugin lifecycle: named singletons initialized on load and on reload,
//! with an unload veto (spec §3 "Plugin", §4.3, §7 "Unload safety").

use std::sync::Arc;

/// External-collaborator contract (spec §6 "Module contract").
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Called once at load and again on every reload (SIGHUP-equivalent).
    /// Must be idempotent.
    fn initialize(&self);

    /// Called on shutdown. Returning `false` vetoes unload — some state of
    /// this plugin is still in flight — and the engine retries on a later
    /// shutdown attempt. The default accepts unload unconditionally.
    fn unload(&self, _now: bool) -> bool {
        true
    }
}

/// Plugins load in declared order and unload in reverse, mirroring spec
/// §4.3 ("Plugins are loaded in declared order").
#[derive(Default)]
pub struct PluginRegistry {
    plugins: parking_lot::Mutex<Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers and initializes `plugin`. Returns `false` if a plugin of
    /// the same name is already registered.
    pub fn load(&self, plugin: Arc<dyn Plugin>) -> bool {
        let mut plugins = self.plugins.lock();
        if plugins.iter().any(|p| p.name() == plugin.name()) {
            return false;
        }
        plugin.initialize();
        plugins.push(plugin);
        true
    }

    /// Re-runs `initialize()` on every loaded plugin, in load order.
    pub fn reload_all(&self) {
        for plugin in self.plugins.lock().iter() {
            plugin.initialize();
        }
    }

    /// Attempts to unload every plugin in reverse load order. A plugin
    /// that vetoes (`unload` returns `false`) stays registered; the
    /// returned list names the plugins that vetoed, so the engine can
    /// retry later (spec §7 "Unload safety").
    pub fn unload_all(&self, now: bool) -> Vec<String> {
        let mut plugins = self.plugins.lock();
        let mut vetoed = Vec::new();
        let mut remaining = Vec::new();
        for plugin in plugins.drain(..).rev() {
            if plugin.unload(now) {
                // dropped
            } else {
                vetoed.push(plugin.name().to_owned());
                remaining.push(plugin);
            }
        }
        remaining.reverse();
        *plugins = remaining;
        vetoed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.lock().iter().find(|p| p.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.lock().iter().map(|p| p.name().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPlugin {
        name: &'static str,
        inits: Arc<AtomicUsize>,
        veto: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn initialize(&self) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn unload(&self, _now: bool) -> bool {
            !self.veto.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn load_order_is_preserved_and_init_runs_once_per_reload() {
        let registry = PluginRegistry::new();
        let inits = Arc::new(AtomicUsize::new(0));
        let veto = Arc::new(std::sync::atomic::AtomicBool::new(false));
        registry.load(Arc::new(CountingPlugin { name: "a", inits: inits.clone(), veto: veto.clone() }));
        registry.load(Arc::new(CountingPlugin { name: "b", inits: inits.clone(), veto: veto.clone() }));
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(inits.load(Ordering::SeqCst), 2);
        registry.reload_all();
        assert_eq!(inits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn duplicate_name_load_is_rejected() {
        let registry = PluginRegistry::new();
        let inits = Arc::new(AtomicUsize::new(0));
        let veto = Arc::new(std::sync::atomic::AtomicBool::new(false));
        assert!(registry.load(Arc::new(CountingPlugin { name: "a", inits: inits.clone(), veto: veto.clone() })));
        assert!(!registry.load(Arc::new(CountingPlugin { name: "a", inits, veto })));
    }

    #[test]
    fn unload_veto_keeps_plugin_registered_for_retry() {
        let registry = PluginRegistry::new();
        let inits = Arc::new(AtomicUsize::new(0));
        let veto = Arc::new(std::sync::atomic::AtomicBool::new(true));
        registry.load(Arc::new(CountingPlugin { name: "a", inits, veto: veto.clone() }));
        let vetoed = registry.unload_all(true);
        assert_eq!(vetoed, vec!["a"]);
        assert_eq!(registry.len(), 1);
        veto.store(false, Ordering::SeqCst);
        let vetoed = registry.unload_all(true);
        assert!(vetoed.is_empty());
        assert!(registry.is_empty());
    }
}
