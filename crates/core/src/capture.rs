//! Screen capture functionality.
//!
//! This module provides cross-platform screen capture capabilities,
//! supporting both X11 and Wayland on Linux, as well as Windows and macOS.
//! It also owns the last step of a region capture: grabbing the selected
//! rectangle from the live display and writing it to disk as a PNG.
//!
//! # Example
//!
//! ```ignore
//! use shotlens_core::capture::{self, ScreenCapturer};
//!
//! let capturer = ScreenCapturer::new()?;
//! let monitor = capturer.primary_monitor();
//! let path = capture::save_region(&LiveDisplay, region, &capture::screenshot_dir()?, chrono::Local::now())?;
//! ```

use crate::error::{AppError, Result};
use crate::selection::Region;
use chrono::{DateTime, Local};
use directories::BaseDirs;
use image::{DynamicImage, ImageFormat, RgbaImage};
use screenshots::Screen;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Delay between hiding the selection chrome and re-reading the display.
pub const CAPTURE_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Origin and size of a physical display.
///
/// Recorded once when the overlay is built; all overlay-local coordinates
/// are translated by this origin before pixels are read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorDescriptor {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f32,
}

impl MonitorDescriptor {
    fn from_screen(screen: &Screen) -> Self {
        let info = &screen.display_info;
        Self {
            x: info.x,
            y: info.y,
            width: info.width,
            height: info.height,
            scale_factor: info.scale_factor,
        }
    }
}

impl fmt::Display for MonitorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {}) (scale: {})",
            self.width, self.height, self.x, self.y, self.scale_factor
        )
    }
}

/// Something that can read a rectangle of pixels from the live display.
pub trait ScreenGrabber {
    /// Reads `region`, given in absolute screen coordinates.
    fn grab_region(&self, region: Region) -> Result<RgbaImage>;
}

/// Screen capturer that provides multi-monitor screenshot capabilities.
///
/// This struct wraps the `screenshots` crate and provides a convenient API
/// for capturing entire screens or specific regions.
pub struct ScreenCapturer {
    screens: Vec<Screen>,
}

impl ScreenCapturer {
    /// Initializes the screen capturer by detecting available screens.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ScreenCapture`] if:
    /// - Screen enumeration fails (e.g., no display server available)
    /// - No screens are detected
    pub fn new() -> Result<Self> {
        let screens = Screen::all()
            .map_err(|e| AppError::capture(format!("Failed to enumerate screens: {}", e)))?;

        if screens.is_empty() {
            return Err(AppError::capture("No screens detected"));
        }

        Ok(Self { screens })
    }

    /// Lists available screens with their geometry and metadata.
    pub fn list_screen(&self) -> Vec<String> {
        self.screens
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let primary = if s.display_info.is_primary { " [primary]" } else { "" };
                format!("Monitor {}: {}{}", i, MonitorDescriptor::from_screen(s), primary)
            })
            .collect()
    }

    fn primary_index(&self) -> usize {
        self.screens
            .iter()
            .position(|s| s.display_info.is_primary)
            .unwrap_or(0)
    }

    /// Describes the primary display, falling back to the first one detected.
    pub fn primary_monitor(&self) -> MonitorDescriptor {
        MonitorDescriptor::from_screen(&self.screens[self.primary_index()])
    }

    /// Captures the primary screen.
    pub fn capture_primary(&self) -> Result<DynamicImage> {
        self.capture_screen_by_index(self.primary_index())
    }

    /// Captures a specific screen by its index.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - [`AppError::ScreenNotFound`] if the index is out of bounds
    /// - [`AppError::ScreenCapture`] if the capture operation fails
    pub fn capture_screen_by_index(&self, index: usize) -> Result<DynamicImage> {
        let screen = self
            .screens
            .get(index)
            .ok_or(AppError::ScreenNotFound(index))?;

        let captured = screen
            .capture()
            .map_err(|e| AppError::capture(format!("Failed to capture screen: {}", e)))?;

        let image = to_rgba_image(captured.width(), captured.height(), captured.into_raw())?;
        Ok(DynamicImage::ImageRgba8(image))
    }

    /// Captures a whole screen and saves it as a timestamped PNG in `dir`.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::capture_screen_by_index`], or when the file cannot
    /// be written. Nothing is written for an unknown index.
    pub fn save_screen(&self, index: usize, dir: &Path) -> Result<PathBuf> {
        let image = self.capture_screen_by_index(index)?;
        save_image(&image.to_rgba8(), dir, Local::now())
    }
}

/// The live display, read through the `screenshots` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveDisplay;

impl ScreenGrabber for LiveDisplay {
    fn grab_region(&self, region: Region) -> Result<RgbaImage> {
        if region.is_empty() {
            return Err(AppError::EmptySelection);
        }

        // capture_area works in coordinates relative to the owning screen
        let screen = Screen::from_point(region.x, region.y)
            .map_err(|e| AppError::capture(format!("No screen contains the region: {}", e)))?;
        let local_x = region.x - screen.display_info.x;
        let local_y = region.y - screen.display_info.y;

        debug!(?region, local_x, local_y, "grabbing region");
        let captured = screen
            .capture_area(local_x, local_y, region.width as u32, region.height as u32)
            .map_err(|e| AppError::capture(format!("Failed to capture region: {}", e)))?;

        to_rgba_image(captured.width(), captured.height(), captured.into_raw())
    }
}

// screenshots links its own copy of `image`, so go through raw RGBA bytes
fn to_rgba_image(width: u32, height: u32, rgba: Vec<u8>) -> Result<RgbaImage> {
    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| AppError::capture("Failed to create image buffer"))
}

/// Directory where captures are written: `~/Documents/WritingTools/screenshots`.
///
/// Always the literal `Documents` folder under home, never a localized or
/// redirected documents directory.
pub fn screenshot_dir() -> Result<PathBuf> {
    let dirs = BaseDirs::new().ok_or_else(|| AppError::config("Cannot locate home directory"))?;
    Ok(screenshot_dir_in(dirs.home_dir()))
}

fn screenshot_dir_in(home: &Path) -> PathBuf {
    home.join("Documents").join("WritingTools").join("screenshots")
}

/// File name for a capture taken at `taken_at`.
///
/// Only second resolution: two captures within the same second share a name
/// and the later one overwrites the earlier.
pub fn screenshot_file_name(taken_at: DateTime<Local>) -> String {
    format!("screenshot_{}.png", taken_at.format("%Y%m%d_%H%M%S"))
}

/// Grabs `region` (absolute coordinates) and writes it as a PNG into `dir`.
///
/// The directory is created if missing. Returns the full path of the file.
///
/// # Errors
///
/// Returns [`AppError::EmptySelection`] for a zero-area region, and
/// capture or I/O errors otherwise.
pub fn save_region<G: ScreenGrabber + ?Sized>(
    grabber: &G,
    region: Region,
    dir: &Path,
    taken_at: DateTime<Local>,
) -> Result<PathBuf> {
    if region.is_empty() {
        return Err(AppError::EmptySelection);
    }

    let image = grabber.grab_region(region)?;
    save_image(&image, dir, taken_at)
}

/// Writes `image` as a PNG named after `taken_at` into `dir`, creating it.
pub fn save_image(image: &RgbaImage, dir: &Path, taken_at: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let path = dir.join(screenshot_file_name(taken_at));
    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| AppError::image(format!("Failed to write {}: {}", path.display(), e)))?;

    info!(path = %path.display(), width = image.width(), height = image.height(), "screenshot saved");
    Ok(path)
}

/// Runs [`save_region`] on a worker thread once `delay` has elapsed.
///
/// The caller hides its windows before spawning; the worker never touches
/// the UI, it only reads the display and hands the outcome to `on_done`.
pub fn spawn_deferred_save<G, F>(
    grabber: G,
    region: Region,
    dir: PathBuf,
    delay: Duration,
    on_done: F,
) -> JoinHandle<()>
where
    G: ScreenGrabber + Send + 'static,
    F: FnOnce(Result<PathBuf>) + Send + 'static,
{
    thread::spawn(move || {
        thread::sleep(delay);
        debug!(?region, "reading live display");
        on_done(save_region(&grabber, region, &dir, Local::now()));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Instant;
    use tempfile::TempDir;

    /// Paints each pixel with its absolute coordinates so crops can be checked.
    #[derive(Clone)]
    struct FakeDisplay {
        calls: Arc<AtomicUsize>,
    }

    impl FakeDisplay {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ScreenGrabber for FakeDisplay {
        fn grab_region(&self, region: Region) -> Result<RgbaImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RgbaImage::from_fn(
                region.width as u32,
                region.height as u32,
                |x, y| {
                    let ax = region.x + x as i32;
                    let ay = region.y + y as i32;
                    Rgba([ax as u8, ay as u8, 0, 255])
                },
            ))
        }
    }

    fn fixed_time(second: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, second)
            .single()
            .unwrap()
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(
            screenshot_file_name(fixed_time(7)),
            "screenshot_20240309_140507.png"
        );
    }

    #[test]
    fn test_screenshot_dir_is_documents_under_home() {
        let dir = screenshot_dir_in(Path::new("/home/ada"));
        assert_eq!(dir, PathBuf::from("/home/ada/Documents/WritingTools/screenshots"));
    }

    #[test]
    fn test_screenshot_dir_uses_home_directory() {
        let home = BaseDirs::new().unwrap().home_dir().to_path_buf();
        let dir = screenshot_dir().unwrap();
        assert!(dir.starts_with(&home));
        assert!(dir.ends_with("Documents/WritingTools/screenshots"));
        assert_eq!(dir.components().count(), home.components().count() + 3);
    }

    #[test]
    fn test_save_region_writes_png_of_selection_size() {
        let tmp = TempDir::new().unwrap();
        let out_dir = tmp.path().join("nested").join("shots");
        let display = FakeDisplay::new();
        let region = Region {
            x: 12,
            y: 30,
            width: 40,
            height: 25,
        };

        let path = save_region(&display, region, &out_dir, fixed_time(1)).unwrap();

        assert_eq!(path, out_dir.join("screenshot_20240309_140501.png"));
        let saved = image::open(&path).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (40, 25));
        assert_eq!(saved.get_pixel(0, 0), &Rgba([12, 30, 0, 255]));
        assert_eq!(saved.get_pixel(39, 24), &Rgba([51, 54, 0, 255]));
    }

    #[test]
    fn test_empty_region_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let display = FakeDisplay::new();
        let region = Region {
            x: 0,
            y: 0,
            width: 0,
            height: 10,
        };

        let result = save_region(&display, region, tmp.path(), fixed_time(1));

        assert!(matches!(result, Err(AppError::EmptySelection)));
        assert_eq!(display.calls(), 0);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_same_second_captures_overwrite() {
        let tmp = TempDir::new().unwrap();
        let display = FakeDisplay::new();
        let first = Region {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        };
        let second = Region {
            x: 0,
            y: 0,
            width: 20,
            height: 5,
        };

        let a = save_region(&display, first, tmp.path(), fixed_time(9)).unwrap();
        let b = save_region(&display, second, tmp.path(), fixed_time(9)).unwrap();

        assert_eq!(a, b);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
        assert_eq!(image::open(&b).unwrap().to_rgba8().dimensions(), (20, 5));
    }

    #[test]
    fn test_deferred_save_waits_before_reading_display() {
        let tmp = TempDir::new().unwrap();
        let display = FakeDisplay::new();
        let region = Region {
            x: 5,
            y: 5,
            width: 8,
            height: 6,
        };
        let delay = Duration::from_millis(80);
        let (tx, rx) = mpsc::channel();

        let started = Instant::now();
        let worker = spawn_deferred_save(
            display.clone(),
            region,
            tmp.path().to_path_buf(),
            delay,
            move |result| {
                let _ = tx.send((started.elapsed(), result));
            },
        );
        assert_eq!(display.calls(), 0);

        let (elapsed, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        worker.join().unwrap();

        assert!(elapsed >= delay);
        assert_eq!(display.calls(), 1);
        let path = result.unwrap();
        assert_eq!(image::open(&path).unwrap().to_rgba8().dimensions(), (8, 6));
    }

    #[test]
    fn test_deferred_save_reports_empty_region() {
        let tmp = TempDir::new().unwrap();
        let display = FakeDisplay::new();
        let region = Region {
            x: 0,
            y: 0,
            width: 4,
            height: 0,
        };
        let (tx, rx) = mpsc::channel();

        spawn_deferred_save(
            display.clone(),
            region,
            tmp.path().to_path_buf(),
            Duration::ZERO,
            move |result| {
                let _ = tx.send(result);
            },
        )
        .join()
        .unwrap();

        assert!(matches!(rx.recv().unwrap(), Err(AppError::EmptySelection)));
        assert_eq!(display.calls(), 0);
    }

    #[test]
    fn test_save_image_writes_full_frame() {
        let tmp = TempDir::new().unwrap();
        let frame = RgbaImage::from_pixel(32, 18, Rgba([1, 2, 3, 255]));

        let path = save_image(&frame, &tmp.path().join("monitors"), fixed_time(3)).unwrap();

        assert!(path.ends_with("monitors/screenshot_20240309_140503.png"));
        assert_eq!(image::open(&path).unwrap().to_rgba8(), frame);
    }

    #[test]
    fn test_save_unknown_screen_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("screens");
        let capturer = ScreenCapturer { screens: Vec::new() };

        let err = capturer.save_screen(3, &dir).unwrap_err();

        assert!(matches!(err, AppError::ScreenNotFound(3)));
        assert!(!dir.exists());
    }
}
