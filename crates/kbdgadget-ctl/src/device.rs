//! The device port: the single open handle to the HID gadget character
//! device, behind an object-safe async trait.
//!
//! The trait exists so the keyboard controller, LED monitor and tests
//! never care whether frames go to a real `/dev/hidgN` or to the
//! in-memory [`mock::RecordingPort`]. The write path is serialized: one
//! report frame is in flight at a time, so interleaved sequences from
//! concurrent jobs can never merge into a corrupted frame. The read
//! path (LED status) holds its own handle and proceeds concurrently
//! with writes.

pub mod mock;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Error type for gadget device I/O.
///
/// Device I/O failures are potentially fatal to the whole controller:
/// the gadget is a single exclusive resource, so callers should fail
/// fast rather than retry.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The gadget device could not be opened. Fatal to construction.
    #[error("failed to open HID gadget device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A read or write on the open device failed.
    #[error("HID gadget I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A report write transferred fewer bytes than one frame.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// The device endpoint reported end-of-stream.
    #[error("HID gadget device closed")]
    Closed,
}

/// Byte-oriented access to the keyboard gadget endpoint.
///
/// `write_report` accepts one fixed-size report frame; `read_status`
/// blocks until the host pushes the next LED status byte.
#[async_trait]
pub trait DevicePort: Send + Sync {
    /// Writes one 8-byte report frame. Implementations must serialize
    /// writes so a frame is never interleaved with another.
    async fn write_report(&self, frame: &[u8; 8]) -> Result<(), DeviceError>;

    /// Blocks until the next LED status byte arrives from the host.
    async fn read_status(&self) -> Result<u8, DeviceError>;
}

/// The real gadget port over `/dev/hidgN`.
///
/// Two handles are opened on the same device node: one dedicated to
/// report writes, one to LED status reads, each behind its own mutex,
/// so LED monitoring never stalls typing and vice versa.
pub struct GadgetPort {
    writer: Mutex<File>,
    reader: Mutex<File>,
}

impl GadgetPort {
    /// Opens the gadget device read-write.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Open`] if the device node cannot be
    /// opened; this is fatal to controller construction.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let open = |write: bool| {
            let mut opts = OpenOptions::new();
            opts.read(true).write(write);
            opts
        };
        let writer = open(true).open(path).await.map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = open(false).open(path).await.map_err(|source| DeviceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "opened HID gadget device");
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }
}

#[async_trait]
impl DevicePort for GadgetPort {
    async fn write_report(&self, frame: &[u8; 8]) -> Result<(), DeviceError> {
        let mut writer = self.writer.lock().await;
        // The gadget driver consumes whole frames; a single write either
        // transfers the full report or something is wrong with the
        // endpoint.
        let written = writer.write(frame).await?;
        if written != frame.len() {
            return Err(DeviceError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        writer.flush().await?;
        Ok(())
    }

    async fn read_status(&self) -> Result<u8, DeviceError> {
        let mut reader = self.reader.lock().await;
        let mut byte = [0u8; 1];
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(DeviceError::Closed);
        }
        Ok(byte[0])
    }
}
