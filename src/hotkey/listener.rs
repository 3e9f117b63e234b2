//! Input event sources backed by evdev character devices
//!
//! A source exposes a readiness wait and a queue of raw events. The real
//! source wraps an `evdev::Device` in a tokio `AsyncFd` so the event loop
//! can await the device without a dedicated thread.

use std::collections::VecDeque;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use evdev::{Device, InputEvent};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::{debug, info, warn};

/// A pollable stream of raw input events
pub trait InputSource {
    /// Wait until the device has data. Blocks indefinitely.
    async fn wait(&mut self) -> io::Result<()>;

    /// Pull everything the device has buffered into the internal queue
    fn dispatch(&mut self) -> io::Result<()>;

    /// Pop the oldest queued event
    fn next_event(&mut self) -> Option<InputEvent>;
}

/// Opens and closes input sources for a device path
pub trait DeviceAccess {
    type Source: InputSource;

    /// Open the device, optionally asking for exclusive access
    fn acquire(&self, path: &Path, grab: bool) -> Result<Self::Source, SourceError>;

    /// Give the device back to the system
    fn release(&self, source: Self::Source);
}

/// Errors that can occur while opening or reading an input device
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("device doesn't exist: {0}")]
    NotFound(PathBuf),

    #[error("device isn't a valid character device: {0}")]
    NotCharDevice(PathBuf),

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("input source failed: {0}")]
    Io(#[from] io::Error),
}

/// Check that `path` exists and is a character device
pub fn validate_device(path: &Path) -> Result<(), SourceError> {
    let metadata =
        std::fs::metadata(path).map_err(|_| SourceError::NotFound(path.to_owned()))?;

    if !metadata.file_type().is_char_device() {
        return Err(SourceError::NotCharDevice(path.to_owned()));
    }

    Ok(())
}

/// Device access through the kernel evdev interface
#[derive(Debug, Default, Clone, Copy)]
pub struct EvdevAccess;

/// An opened evdev device registered with the tokio reactor
pub struct EvdevSource {
    fd: AsyncFd<Device>,
    path: PathBuf,
    grabbed: bool,
    queue: VecDeque<InputEvent>,
}

impl DeviceAccess for EvdevAccess {
    type Source = EvdevSource;

    fn acquire(&self, path: &Path, grab: bool) -> Result<EvdevSource, SourceError> {
        let open_error = |source| SourceError::Open {
            path: path.to_owned(),
            source,
        };

        let mut device = Device::open(path).map_err(open_error)?;

        let grabbed = grab
            && match device.grab() {
                Ok(()) => {
                    info!(?path, "grabbed device");
                    true
                }
                Err(e) => {
                    warn!(?path, ?e, "grab requested, but failed; continuing without exclusive access");
                    false
                }
            };

        set_nonblocking(&device).map_err(open_error)?;
        // SAFETY: `Device` owns its file descriptor and keeps it open, unchanged,
        // until it is dropped or handed back through `into_inner`.
        let fd = unsafe { AsyncFd::register_with_interest(device, Interest::READABLE) }
            .map_err(|e| open_error(io::Error::from(e)))?;

        info!(
            ?path,
            name = fd.get_ref().name().unwrap_or("unknown"),
            grabbed,
            "input device opened"
        );

        Ok(EvdevSource {
            fd,
            path: path.to_owned(),
            grabbed,
            queue: VecDeque::new(),
        })
    }

    fn release(&self, source: EvdevSource) {
        let EvdevSource {
            fd, path, grabbed, ..
        } = source;
        let mut device = fd.into_inner();

        if grabbed {
            if let Err(e) = device.ungrab() {
                warn!(?path, ?e, "failed to release grab");
            }
        }

        debug!(?path, "input device closed");
    }
}

impl InputSource for EvdevSource {
    async fn wait(&mut self) -> io::Result<()> {
        let mut guard = self.fd.readable_mut().await?;
        // Edge-triggered: the next wait only resolves for data arriving
        // after this point, and dispatch reads until the device would block.
        guard.clear_ready();
        Ok(())
    }

    fn dispatch(&mut self) -> io::Result<()> {
        loop {
            let before = self.queue.len();
            match self.fd.get_mut().fetch_events() {
                Ok(events) => self.queue.extend(events),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(path = ?self.path, ?e, "failed to read events");
                    return Err(e);
                }
            }
            if self.queue.len() == before {
                break;
            }
        }
        Ok(())
    }

    fn next_event(&mut self) -> Option<InputEvent> {
        self.queue.pop_front()
    }
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let raw_fd = device.as_raw_fd();

    let current = unsafe { libc::fcntl(raw_fd, libc::F_GETFL) };
    if current < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { libc::fcntl(raw_fd, libc::F_SETFL, current | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
