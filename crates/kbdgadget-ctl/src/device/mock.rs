//! Mock device port for unit and integration testing.
//!
//! The real [`GadgetPort`](super::GadgetPort) needs a configured USB
//! gadget and a host on the other end of the cable. The
//! [`RecordingPort`] replaces it with in-memory recording: every frame
//! written lands in a `Mutex<Vec<[u8; 8]>>` for later assertions, and
//! LED status bytes are fed in through a channel sender held by the
//! test.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::{DeviceError, DevicePort};

/// A device port that records writes and replays scripted LED bytes.
pub struct RecordingPort {
    /// Every frame passed to `write_report`, in write order.
    pub frames: StdMutex<Vec<[u8; 8]>>,
    /// When set, every write fails with an I/O error.
    pub fail_writes: AtomicBool,
    led_rx: Mutex<mpsc::UnboundedReceiver<u8>>,
}

impl RecordingPort {
    /// Creates a port plus the sender used to feed LED status bytes.
    pub fn new() -> (Self, mpsc::UnboundedSender<u8>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let port = Self {
            frames: StdMutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            led_rx: Mutex::new(rx),
        };
        (port, tx)
    }

    /// All recorded frames.
    pub fn written(&self) -> Vec<[u8; 8]> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl DevicePort for RecordingPort {
    async fn write_report(&self, frame: &[u8; 8]) -> Result<(), DeviceError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(DeviceError::Io(std::io::Error::other("injected failure")));
        }
        self.frames.lock().unwrap().push(*frame);
        Ok(())
    }

    async fn read_status(&self) -> Result<u8, DeviceError> {
        let mut rx = self.led_rx.lock().await;
        rx.recv().await.ok_or(DeviceError::Closed)
    }
}
