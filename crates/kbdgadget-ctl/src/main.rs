//! Headless demo driver for the keyboard gadget controller.
//!
//! Opens the gadget device, loads language maps, then exercises the
//! controller end to end: types the printable-ASCII test string,
//! presses a few combos, runs a script synchronously and in the
//! background, and waits for LED changes driven from the host side.
//!
//! The script engine wired in here is a deliberately small
//! line-oriented one (one host command per line); a full embedded
//! evaluator plugs in through the same [`ScriptEngine`] trait.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kbdgadget_core::keycodes::led;
use kbdgadget_core::langmap::{builtin, MapStore};

use kbdgadget_ctl::config::{self, DEFAULT_CONFIG_PATH};
use kbdgadget_ctl::device::{DevicePort, GadgetPort};
use kbdgadget_ctl::script::{EngineError, ScriptEngine, ScriptHost};
use kbdgadget_ctl::HidController;

const TEST_STRING: &str =
    " !\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~";

/// Minimal line-oriented script engine: `press <combo>`, `type <text>`,
/// `delay <ms>`, `waitled <ms>`, `log <message>`. Returns the number of
/// executed lines.
struct LineEngine;

#[async_trait]
impl ScriptEngine for LineEngine {
    async fn eval(&self, script: &str, host: &ScriptHost) -> Result<Value, EngineError> {
        let mut executed = 0u64;
        for line in script.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
            match cmd {
                "press" => host.press(arg).await?,
                "type" => host.type_string(arg).await?,
                "delay" => {
                    let millis = arg
                        .parse()
                        .map_err(|e| EngineError::Eval(format!("bad delay '{arg}': {e}")))?;
                    host.delay(millis).await?;
                }
                "log" => host.log(arg),
                "waitled" => {
                    let millis = arg
                        .parse()
                        .map_err(|e| EngineError::Eval(format!("bad timeout '{arg}': {e}")))?;
                    host.wait_led(led::ANY, millis).await?;
                }
                other => return Err(EngineError::Eval(format!("unknown command '{other}'"))),
            }
            executed += 1;
        }
        Ok(json!(executed))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // Initialise structured logging. Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.log.level.clone())),
        )
        .init();

    info!("keyboard gadget controller starting");

    let port = GadgetPort::open(&cfg.device.path)
        .await
        .with_context(|| format!("opening gadget device {}", cfg.device.path.display()))?;
    let port: Arc<dyn DevicePort> = Arc::new(port);

    // Built-in US map first, so there is always an active map, then the
    // on-disk maps (a map file named "US" replaces the built-in one).
    let mut store = MapStore::new();
    store.insert(builtin::us_ascii());
    match store.load_directory(&cfg.keyboard.keymap_dir) {
        Ok(report) => {
            for (path, err) in &report.failures {
                warn!(path = %path.display(), error = %err, "skipped unloadable language map");
            }
            info!(loaded = ?report.loaded, "language maps loaded");
        }
        Err(e) => warn!(
            dir = %cfg.keyboard.keymap_dir.display(),
            error = %e,
            "keymap directory not readable, continuing with built-in maps"
        ),
    }

    let controller = HidController::new(port, Arc::new(RwLock::new(store)), Arc::new(LineEngine));
    controller.apply_keyboard_config(&cfg.keyboard).await?;

    info!(
        maps = ?controller.keyboard().list_language_map_names().await,
        active = ?controller.keyboard().active_language_map_name().await,
        "controller ready"
    );

    // ── Typing ─────────────────────────────────────────────────────────────────
    info!("typing printable-ASCII test string");
    if let Err(e) = controller.type_string(TEST_STRING).await {
        warn!(error = %e, "typing finished with unmapped symbols or errors");
    }
    controller.type_string("\n").await.ok();

    // ── Combos ─────────────────────────────────────────────────────────────────
    for combo in ["SHIFT 1", "ENTER", "ALT TAB", "  WIN "] {
        info!(combo, "pressing combo");
        if let Err(e) = controller.press_key_combo(combo).await {
            error!(combo, error = %e, "combo failed");
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    // ── Scripts ────────────────────────────────────────────────────────────────
    let script = "log typing from script\ntype hello from a script\npress ENTER";
    match controller.run_script(script).await {
        Ok(value) => info!(%value, "synchronous script finished"),
        Err(e) => error!(error = %e, "synchronous script failed"),
    }

    let background = "log background job starting\ndelay 2000\ntype done\npress ENTER";
    let (id, job) = controller.start_script_background(background);
    info!(job = id, running = ?controller.running_background_jobs(), "background job started");
    match job.wait_result().await {
        Ok(value) => info!(job = id, %value, "background job finished"),
        Err(e) => warn!(job = id, error = %e, "background job did not complete"),
    }

    // ── LED triggers ───────────────────────────────────────────────────────────
    info!("waiting up to 15s for any LED change (toggle a lock key on the host)");
    match controller.wait_led_change(led::ANY, Duration::from_secs(15)).await {
        Ok(state) => info!(?state, "LED change observed"),
        Err(e) => warn!(error = %e, "no LED change"),
    }

    info!("waiting up to 15s for a NumLock LED change");
    match controller
        .wait_led_change(led::NUM_LOCK, Duration::from_secs(15))
        .await
    {
        Ok(state) => info!(num_lock = state.num_lock(), "NumLock change observed"),
        Err(e) => warn!(error = %e, "no NumLock change"),
    }

    controller.cancel_all_background_jobs();
    info!("keyboard gadget controller stopped");
    Ok(())
}
