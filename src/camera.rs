// src/camera.rs

use crate::types::{CameraConfig, Device};
use anyhow::{bail, Context, Result};
use opencv::{
    core::{Mat, Size},
    imgcodecs, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Where control-loop frames come from.
pub trait FrameSource {
    /// Next BGR frame. `Ok(None)` means the device produced nothing this time.
    fn capture(&mut self) -> Result<Option<Mat>>;

    fn release(&mut self) -> Result<()>;

    /// Replay sources run out; live cameras never do.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Settling time to wait after opening, before the first capture.
    fn warmup(&self) -> Duration {
        Duration::ZERO
    }
}

/// Scale `frame` to the configured resolution so ROI geometry holds.
fn conform(frame: Mat, width: i32, height: i32) -> Result<Mat> {
    if frame.cols() == width && frame.rows() == height {
        return Ok(frame);
    }
    let mut resized = Mat::default();
    imgproc::resize(
        &frame,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}

// ============================================================================
// LIVE CAMERA / VIDEO FILE
// ============================================================================

pub struct CameraSource {
    cap: VideoCapture,
    width: i32,
    height: i32,
    warmup: Duration,
}

impl CameraSource {
    pub fn open_device(config: &CameraConfig) -> Result<Self> {
        info!("📷 Opening camera device {}", config.device_index);
        let cap = VideoCapture::new(config.device_index, videoio::CAP_ANY)
            .with_context(|| format!("opening camera {}", config.device_index))?;
        Self::configure(cap, config)
    }

    pub fn open_file(path: &Path, config: &CameraConfig) -> Result<Self> {
        info!("📼 Opening video: {}", path.display());
        let Some(path_str) = path.to_str() else {
            bail!("video path is not valid UTF-8: {}", path.display());
        };
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .with_context(|| format!("opening video {}", path.display()))?;
        Self::configure(cap, config)
    }

    fn configure(mut cap: VideoCapture, config: &CameraConfig) -> Result<Self> {
        if !cap.is_opened()? {
            bail!("capture device did not open");
        }

        let requested = [
            (videoio::CAP_PROP_FRAME_WIDTH, config.width as f64),
            (videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64),
            (videoio::CAP_PROP_FPS, config.framerate),
        ];
        for (prop, value) in requested {
            if !cap.set(prop, value)? {
                debug!("Capture property {} = {} not accepted", prop, value);
            }
        }

        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
        let fps = cap.get(videoio::CAP_PROP_FPS)?;
        info!("Capture properties: {:.0}x{:.0} @ {:.1} FPS", width, height, fps);

        Ok(Self {
            cap,
            width: config.width,
            height: config.height,
            warmup: config.warmup(),
        })
    }
}

impl FrameSource for CameraSource {
    fn capture(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(conform(frame, self.width, self.height)?))
    }

    fn release(&mut self) -> Result<()> {
        self.cap.release()?;
        info!("📷 Capture released");
        Ok(())
    }

    fn warmup(&self) -> Duration {
        self.warmup
    }
}

// ============================================================================
// IMAGE DIRECTORY REPLAY
// ============================================================================

pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    width: i32,
    height: i32,
}

impl ImageDirSource {
    pub fn open(dir: &Path, config: &CameraConfig) -> Result<Self> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            bail!("no images found in {}", dir.display());
        }
        info!("🗂️  Replaying {} image(s) from {}", files.len(), dir.display());

        Ok(Self {
            files,
            next: 0,
            width: config.width,
            height: config.height,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn capture(&mut self) -> Result<Option<Mat>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let Some(path_str) = path.to_str() else {
            bail!("image path is not valid UTF-8: {}", path.display());
        };
        let image = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)
            .with_context(|| format!("reading {}", path.display()))?;
        if image.empty() {
            warn!("Unreadable image skipped: {}", path.display());
            return Ok(None);
        }
        Ok(Some(conform(image, self.width, self.height)?))
    }

    fn release(&mut self) -> Result<()> {
        debug!("Image replay stopped at {}/{}", self.next, self.files.len());
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.next >= self.files.len()
    }
}

/// Open the configured frame source: a replay directory, a video file, or
/// the live camera.
pub fn open_frame_source(config: &CameraConfig) -> Device<Box<dyn FrameSource>> {
    fn boxed<S: FrameSource + 'static>(source: S) -> Box<dyn FrameSource> {
        Box::new(source)
    }

    let source = match config.source_path.as_deref().map(Path::new) {
        Some(path) if path.is_dir() => ImageDirSource::open(path, config).map(boxed),
        Some(path) => CameraSource::open_file(path, config).map(boxed),
        None => CameraSource::open_device(config).map(boxed),
    };
    Device::from_result(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{self, Scalar, Vector};
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lane_rover_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_image(path: &Path, value: f64, width: i32, height: i32) {
        let image =
            Mat::new_rows_cols_with_default(height, width, core::CV_8UC3, Scalar::all(value))
                .unwrap();
        assert!(imgcodecs::imwrite(path.to_str().unwrap(), &image, &Vector::new()).unwrap());
    }

    #[test]
    fn test_image_dir_replays_in_order() {
        let dir = scratch_dir("replay");
        write_image(&dir.join("b.png"), 200.0, 640, 480);
        write_image(&dir.join("a.png"), 100.0, 640, 480);
        fs::write(dir.join("notes.txt"), "not an image").unwrap();

        let mut source = ImageDirSource::open(&dir, &CameraConfig::default()).unwrap();
        assert_eq!(source.files.len(), 2);

        let first = source.capture().unwrap().unwrap();
        assert_eq!(*first.at_2d::<core::Vec3b>(0, 0).unwrap(), core::Vec3b::all(100));
        let second = source.capture().unwrap().unwrap();
        assert_eq!(*second.at_2d::<core::Vec3b>(0, 0).unwrap(), core::Vec3b::all(200));

        assert!(source.is_exhausted());
        assert!(source.capture().unwrap().is_none());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_image_dir_resizes_to_configured_resolution() {
        let dir = scratch_dir("resize");
        write_image(&dir.join("small.png"), 50.0, 320, 240);

        let mut source = ImageDirSource::open(&dir, &CameraConfig::default()).unwrap();
        let frame = source.capture().unwrap().unwrap();
        assert_eq!((frame.cols(), frame.rows()), (640, 480));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_dir_is_unavailable() {
        let dir = scratch_dir("empty");
        let config = CameraConfig {
            source_path: Some(dir.to_string_lossy().into_owned()),
            ..CameraConfig::default()
        };
        assert!(matches!(
            open_frame_source(&config),
            Device::Unavailable { .. }
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_video_is_unavailable() {
        let config = CameraConfig {
            source_path: Some("/nonexistent/lane_rover/clip.mp4".to_string()),
            ..CameraConfig::default()
        };
        match open_frame_source(&config) {
            Device::Unavailable { reason } => assert!(!reason.is_empty()),
            Device::Ready(_) => panic!("missing video opened"),
        }
    }
}
