// pothole-camera/src/manager.rs
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use opencv::core::Mat;

use crate::{CameraBackend, CameraError, CameraInfo, CaptureSettings, FrameSource, Result};

/// Pause after releasing a device so slow drivers can let go of it.
pub const DEFAULT_RELEASE_DELAY: Duration = Duration::from_millis(500);

/// A device index that opened and produced a frame during [`CameraManager::probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedCamera {
    pub index: i32,
    pub name: String,
}

/// Result of [`CameraManager::switch`]. `index` is the index in effect afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub success: bool,
    pub index: i32,
    pub message: String,
}

struct Slot {
    index: i32,
    source: Option<Box<dyn FrameSource>>,
}

/// Owner of the process-wide capture handle.
///
/// Every open, reopen, switch and probe runs with the slot locked, so only
/// one open attempt is ever in flight. Reads take the same lock for the
/// duration of a single frame.
pub struct CameraManager {
    backend: Arc<dyn CameraBackend>,
    settings: CaptureSettings,
    release_delay: Duration,
    slot: Mutex<Slot>,
}

impl CameraManager {
    pub fn new(backend: Arc<dyn CameraBackend>, settings: CaptureSettings, index: i32) -> Self {
        Self {
            backend,
            settings,
            release_delay: DEFAULT_RELEASE_DELAY,
            slot: Mutex::new(Slot { index, source: None }),
        }
    }

    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // A panic mid-read must not take the camera down for every later stream.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_index(&self) -> i32 {
        self.lock().index
    }

    pub fn is_open(&self) -> bool {
        self.lock().source.is_some()
    }

    /// Open the current index unless a handle is already open.
    pub fn acquire(&self) -> Result<CameraInfo> {
        let mut slot = self.lock();
        self.ensure_open(&mut slot)
    }

    fn ensure_open(&self, slot: &mut Slot) -> Result<CameraInfo> {
        if let Some(source) = slot.source.as_ref() {
            return source.info();
        }

        info!("opening camera {} ({} backend)", slot.index, self.backend.name());
        let source = self.backend.open(slot.index, &self.settings)?;
        let info = source.info()?;
        info!(
            "camera {} open: {}x{} @ {:.1} fps",
            info.index, info.width, info.height, info.fps
        );
        slot.source = Some(source);
        Ok(info)
    }

    /// Next frame from the open handle.
    pub fn read(&self) -> Result<Mat> {
        let mut slot = self.lock();
        let source = slot.source.as_mut().ok_or(CameraError::NotOpen)?;
        source.read()
    }

    /// Drop the handle, give the driver a moment, and open the same index again.
    pub fn reopen(&self) -> Result<CameraInfo> {
        let mut slot = self.lock();
        if slot.source.take().is_some() {
            debug!("released camera {} for reopen", slot.index);
            thread::sleep(self.release_delay);
        }
        self.ensure_open(&mut slot)
    }

    /// Close the current device and move to `index`.
    ///
    /// The new device must open and deliver a frame before it becomes the
    /// shared handle. On failure the previous index stays selected; it is
    /// reopened lazily by the next [`acquire`](Self::acquire).
    pub fn switch(&self, index: i32) -> SwitchOutcome {
        let mut slot = self.lock();
        let previous = slot.index;

        if index < 0 {
            warn!("refusing to switch to camera index {index}");
            return SwitchOutcome {
                success: false,
                index: previous,
                message: format!("Camera index {index} is not valid"),
            };
        }

        if slot.source.take().is_some() {
            info!("closed camera {previous}");
            thread::sleep(self.release_delay);
        }

        match self.open_verified(index) {
            Ok(source) => {
                info!("switched camera {previous} -> {index}");
                slot.index = index;
                slot.source = Some(source);
                SwitchOutcome {
                    success: true,
                    index,
                    message: format!("Camera {index} selected"),
                }
            }
            Err(CameraError::Read { .. }) => {
                warn!("camera {index} opened but delivered no frame; keeping camera {previous}");
                SwitchOutcome {
                    success: false,
                    index: previous,
                    message: format!("Camera {index} cannot read frames"),
                }
            }
            Err(e) => {
                warn!("camera {index} could not be opened ({e}); keeping camera {previous}");
                SwitchOutcome {
                    success: false,
                    index: previous,
                    message: format!("Camera {index} could not be opened"),
                }
            }
        }
    }

    fn open_verified(&self, index: i32) -> Result<Box<dyn FrameSource>> {
        let mut source = self.backend.open(index, &self.settings)?;
        source.read()?;
        Ok(source)
    }

    /// Devices in `0..count` that open and yield a frame.
    ///
    /// The device currently held open is listed without being reopened.
    pub fn probe(&self, count: i32) -> Vec<ProbedCamera> {
        let slot = self.lock();
        (0..count)
            .filter(|&index| {
                if index == slot.index && slot.source.is_some() {
                    return true;
                }
                match self.open_verified(index) {
                    Ok(_) => true,
                    Err(e) => {
                        debug!("probe camera {index}: {e}");
                        false
                    }
                }
            })
            .map(|index| ProbedCamera { index, name: format!("Camera {index}") })
            .collect()
    }

    /// Properties of the open device, `None` while closed.
    pub fn info(&self) -> Option<CameraInfo> {
        let slot = self.lock();
        slot.source.as_ref().and_then(|s| s.info().ok())
    }

    pub fn release(&self) {
        let mut slot = self.lock();
        if slot.source.take().is_some() {
            info!("released camera {}", slot.index);
        }
    }
}
