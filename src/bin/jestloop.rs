//! The `jestloop` process: wires an [`Engine`] to a real wall clock,
//! starts its background threads (driver, reaper, bootstrap), and serves
//! the admin/chat-bridge HTTP surface until asked to stop.

use jestloop::app::Engine;
use jestloop::config::EngineConfig;
use jestloop::llm_adapter::ScriptedAdapter;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

fn install_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Registers SIGINT/SIGTERM to flip `shutdown` (§9: graceful stop) via
/// `signal_hook` rather than hand-rolling a signal handler.
fn install_shutdown_signals(shutdown: &Arc<AtomicBool>) {
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(shutdown)) {
            error!(signal = sig, error = %e, "failed to register shutdown signal");
        }
    }
}

fn main() -> ExitCode {
    install_tracing();

    let config = EngineConfig::from_env();
    info!(bind_addr = %config.bind_addr, runs_mode = ?config.runs_mode, "starting jestloop");

    // The real LLM provider client (OpenRouter or otherwise) is an external
    // collaborator outside this crate's scope (§1); `ScriptedAdapter` is the
    // seam a production binary would replace with a concrete client built
    // against `OPENROUTER_API_KEY`.
    let adapter = Arc::new(ScriptedAdapter::new());
    let engine = Arc::new(Engine::new(config, adapter));

    let shutdown = Arc::new(AtomicBool::new(false));
    install_shutdown_signals(&shutdown);

    engine.start();

    let server_engine = Arc::clone(&engine);
    let server_shutdown = Arc::clone(&shutdown);
    let server_thread = std::thread::spawn(move || {
        if let Err(e) = jestloop::http::server::serve(server_engine, server_shutdown) {
            error!(error = %e, "http server exited with error");
        }
    });

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    info!("shutdown signal received, stopping");
    engine.shutdown();
    let _ = server_thread.join();

    ExitCode::SUCCESS
}
