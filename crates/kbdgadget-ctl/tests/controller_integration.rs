//! Integration tests for the controller facade and the script job
//! manager.
//!
//! # Purpose
//!
//! These tests drive the `HidController` through its *public* API the
//! way an embedding application would, over the recording mock port.
//! They verify:
//!
//! - The happy paths: typed strings and combos reach the device as
//!   well-formed 8-byte report frames.
//! - The atomicity contract: concurrent script jobs interleave whole
//!   press+release sequences, never torn frames.
//! - The job lifecycle: unique ids, `running_background_jobs`,
//!   cancellation fan-out to every waiter, and re-running a finished
//!   job on the same instance.
//! - LED waits driven end to end through the facade.
//!
//! # The frame contract
//!
//! Every write to the gadget is exactly 8 bytes:
//!
//! ```text
//! byte 0   modifier bitmask (CTRL/SHIFT/ALT/GUI, left and right)
//! byte 1   reserved, always 0
//! byte 2-7 up to six concurrently pressed keycodes
//! ```
//!
//! A symbol or chord is always a press frame followed by the all-zero
//! neutral frame that releases every key. The tests below assert that
//! this pairing survives concurrency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use kbdgadget_core::keycodes::led;
use kbdgadget_core::langmap::{builtin, MapStore};

use kbdgadget_ctl::device::mock::RecordingPort;
use kbdgadget_ctl::device::DevicePort;
use kbdgadget_ctl::jobs::JobError;
use kbdgadget_ctl::script::{EngineError, ScriptEngine, ScriptHost};
use kbdgadget_ctl::HidController;

/// Line-oriented engine used by every test: one host command per line
/// (`press <combo>`, `type <text>`, `delay <ms>`, `waitled <ms>`,
/// `log <msg>`, plus `spin` which delays in a loop until cancelled).
struct LineEngine;

#[async_trait]
impl ScriptEngine for LineEngine {
    async fn eval(&self, script: &str, host: &ScriptHost) -> Result<Value, EngineError> {
        for line in script.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
            match cmd {
                "press" => host.press(arg).await?,
                "type" => host.type_string(arg).await?,
                "delay" => host.delay(arg.parse().unwrap_or(0)).await?,
                "waitled" => {
                    host.wait_led(led::ANY, arg.parse().unwrap_or(1000)).await?;
                }
                "log" => host.log(arg),
                "spin" => loop {
                    host.delay(5).await?;
                },
                other => return Err(EngineError::Eval(format!("unknown command {other}"))),
            }
        }
        Ok(json!("done"))
    }
}

fn make_controller() -> (
    HidController,
    Arc<RecordingPort>,
    tokio::sync::mpsc::UnboundedSender<u8>,
) {
    let (port, led_tx) = RecordingPort::new();
    let port = Arc::new(port);
    let mut store = MapStore::new();
    store.insert(builtin::us_ascii());
    let controller = HidController::new(
        Arc::clone(&port) as Arc<dyn DevicePort>,
        Arc::new(RwLock::new(store)),
        Arc::new(LineEngine),
    );
    (controller, port, led_tx)
}

const NEUTRAL: [u8; 8] = [0; 8];

// ── Typing and combos through the facade ──────────────────────────────────────

/// Types a string and verifies the full frame contract: per symbol one
/// press frame carrying the expected keycode, then the neutral frame.
#[tokio::test]
async fn test_typing_emits_press_release_frame_pairs() {
    let (controller, port, _led_tx) = make_controller();

    controller.type_string("ok").await.expect("type");

    let frames = port.written();
    assert_eq!(frames.len(), 4);
    for pair in frames.chunks(2) {
        assert_ne!(pair[0], NEUTRAL, "press frame must carry a key");
        assert_eq!(pair[0][1], 0, "reserved byte must stay zero");
        assert_eq!(pair[1], NEUTRAL, "every press must be released");
    }
}

/// A combo press goes out as exactly one chord frame plus the release,
/// with all modifiers folded into byte 0.
#[tokio::test]
async fn test_combo_press_is_a_single_chord_frame() {
    let (controller, port, _led_tx) = make_controller();

    controller.press_key_combo("CTRL SHIFT ESC").await.expect("combo");

    let frames = port.written();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0][0], 0x01 | 0x02); // LCTRL | LSHIFT
    assert_eq!(frames[1], NEUTRAL);
}

// ── Concurrency: frame integrity across jobs ──────────────────────────────────

/// Two background jobs typing concurrently must interleave whole
/// press+release sequences. The recorded stream is checked for the
/// invariant that no two press frames appear back to back.
#[tokio::test]
async fn test_concurrent_jobs_never_tear_press_release_pairs() {
    let (controller, port, _led_tx) = make_controller();

    let (_, job_a) = controller.start_script_background("type aaaaaaaaaa");
    let (_, job_b) = controller.start_script_background("type bbbbbbbbbb");
    job_a.wait_result().await.expect("job a");
    job_b.wait_result().await.expect("job b");

    let frames = port.written();
    assert_eq!(frames.len(), 40, "20 symbols, each press + release");
    let mut previous_was_press = false;
    for frame in &frames {
        let is_press = *frame != NEUTRAL;
        assert!(
            !(is_press && previous_was_press),
            "two press frames in a row means a torn sequence"
        );
        previous_was_press = is_press;
    }
}

// ── Job lifecycle through the facade ──────────────────────────────────────────

/// Background job ids are unique and monotonically increasing, and a
/// running job shows up in `running_background_jobs` until it ends.
#[tokio::test]
async fn test_background_job_ids_and_running_list() {
    let (controller, _port, _led_tx) = make_controller();

    let (id1, _job1) = controller.start_script_background("spin");
    let (id2, job2) = controller.start_script_background("log quick");
    assert!(id2 > id1);

    job2.wait_result().await.expect("quick job");
    tokio::task::yield_now().await;

    let running = controller.running_background_jobs();
    assert!(running.contains(&id1));
    assert!(!running.contains(&id2));

    controller.cancel_all_background_jobs();
}

/// Cancelling a job releases *every* waiter with the cancelled error,
/// and a later `wait_script_result` on the same id sees it too.
#[tokio::test]
async fn test_cancellation_fans_out_to_all_waiters() {
    let (controller, _port, _led_tx) = make_controller();
    let controller = Arc::new(controller);
    let (id, job) = controller.start_script_background("spin");

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.wait_result().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.cancel_background_job(id).expect("cancel");

    for waiter in waiters {
        assert!(matches!(
            waiter.await.expect("join"),
            Err(JobError::Cancelled)
        ));
    }
    assert!(matches!(
        controller.wait_script_result(id).await,
        Err(JobError::Cancelled)
    ));
}

/// A finished job instance can be re-run: the id is preserved, the old
/// result is discarded, and new side effects reach the device.
#[tokio::test]
async fn test_finished_job_is_reusable_with_same_id() {
    let (controller, port, _led_tx) = make_controller();
    let (id, job) = controller.start_script_background("type x");
    job.wait_result().await.expect("first run");
    let frames_after_first = port.written().len();

    controller
        .jobs()
        .start_background_on(&job, "type yz")
        .expect("re-run");
    let value = controller.wait_script_result(id).await.expect("second run");

    assert_eq!(value, json!("done"));
    assert_eq!(port.written().len(), frames_after_first + 4);
}

/// Cancelling an unknown job id is a `NotFound` error, not a panic or
/// a silent no-op.
#[tokio::test]
async fn test_cancel_unknown_job_reports_not_found() {
    let (controller, _port, _led_tx) = make_controller();
    assert!(matches!(
        controller.cancel_background_job(4242),
        Err(JobError::NotFound(4242))
    ));
}

/// A synchronous script run drives the keyboard and returns the
/// engine's result value.
#[tokio::test]
async fn test_run_script_end_to_end() {
    let (controller, port, _led_tx) = make_controller();

    let value = controller
        .run_script("log starting\ntype hi\npress ENTER")
        .await
        .expect("script");

    assert_eq!(value, json!("done"));
    // "hi" = 2 pairs, ENTER = 1 pair.
    assert_eq!(port.written().len(), 6);
}

// ── LED waits through the facade ──────────────────────────────────────────────

/// A host-driven LED change delivered through the mock port satisfies
/// a masked wait on the facade.
#[tokio::test]
async fn test_led_wait_resolves_on_masked_change() {
    let (controller, _port, led_tx) = make_controller();
    let controller = Arc::new(controller);

    let waiter = {
        let c = Arc::clone(&controller);
        tokio::spawn(async move { c.wait_led_change(led::CAPS_LOCK, Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;
    led_tx.send(led::CAPS_LOCK).expect("feed LED byte");

    let state = waiter.await.expect("join").expect("wait");
    assert!(state.caps_lock());
}

/// A script can synchronize on a host LED trigger through its own
/// host binding: it waits for the LED change, then types.
#[tokio::test]
async fn test_script_waits_on_led_change_before_typing() {
    let (controller, port, led_tx) = make_controller();
    let controller = Arc::new(controller);

    let (id, _job) = controller.start_script_background("waitled 5000\ntype go");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        port.written().is_empty(),
        "script must not type before the LED trigger"
    );

    led_tx.send(led::NUM_LOCK).expect("feed LED byte");
    let value = controller.wait_script_result(id).await.expect("script");

    assert_eq!(value, json!("done"));
    assert_eq!(port.written().len(), 4); // "go" = 2 press+release pairs
}

/// A script's LED wait that never triggers fails the job with the
/// timeout error.
#[tokio::test]
async fn test_script_led_wait_timeout_fails_the_job() {
    let (controller, _port, _led_tx) = make_controller();

    let result = controller.run_script("waitled 50").await;

    assert!(matches!(result, Err(JobError::Failed(msg)) if msg.contains("timeout")));
}

/// A script typing while another task waits on LEDs exercises the
/// write and read paths of the shared port concurrently.
#[tokio::test]
async fn test_led_wait_and_typing_share_the_port() {
    let (controller, port, led_tx) = make_controller();
    let controller = Arc::new(controller);

    let waiter = {
        let c = Arc::clone(&controller);
        tokio::spawn(async move { c.wait_led_change(led::ANY, Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;

    controller.type_string("abc").await.expect("type");
    led_tx.send(led::NUM_LOCK).expect("feed LED byte");

    let state = waiter.await.expect("join").expect("wait");
    assert!(state.num_lock());
    assert_eq!(port.written().len(), 6);
}
