//! Cross-module scenarios from spec §8, run against the public API rather
//! than crate-internal unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pbx_core::prelude::*;

#[test]
fn engine_runs_handlers_installed_before_start() {
    let engine = Engine::new(2);
    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = Arc::clone(&seen);
    engine.dispatcher().install(HandlerEntry::new(
        Some("chan.dtmf"),
        0,
        Arc::new(move |msg: &mut Message| {
            seen2.fetch_add(1, Ordering::SeqCst);
            msg.set_retval("ok");
            true
        }),
    ));
    engine.start();
    engine.dispatcher().enqueue(Message::new("chan.dtmf"));
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    engine.stop();
}

#[test]
fn wire_round_trip_survives_ascii_safe_values() {
    let mut msg = Message::new("call.execute");
    msg.set_param("callto", "park/default");
    msg.set_param("id", "sip/1");
    msg.set_retval("");
    let encoded = msg.encode("req-1");
    let (decoded, id) = Message::decode(&encoded).unwrap();
    assert_eq!(id, "req-1");
    assert_eq!(decoded.name(), "call.execute");
    assert_eq!(decoded.get_value("callto", ""), "park/default");
    assert_eq!(decoded.get_value("id", ""), "sip/1");
}

#[test]
fn config_and_runtime_params_drive_plugin_initialize_count() {
    let cfg = Config::parse("[general]\nworkers=2\n");
    let engine = Engine::new(cfg.section("general").unwrap().get_int_value("workers", 1) as usize);
    engine.load_config(cfg);
    assert_eq!(engine.plugins().len(), 0);
}
