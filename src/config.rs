use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::processing::geometry::TileGeometry;
use crate::render::animator::Timing;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct GeometryConfig {
    /// Size of one tile texture, `[width, height]`.
    pub tile_size: [u32; 2],
    /// Size of the whole tiled texture; a multiple of `tile-size` per axis.
    pub texture_size: [u32; 2],
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            tile_size: [256, 256],
            texture_size: [1024, 1024],
        }
    }
}

impl GeometryConfig {
    pub fn tile_geometry(&self) -> Result<TileGeometry> {
        TileGeometry::new(self.tile_size, self.texture_size)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Default time each slide is on screen.
    #[serde(with = "humantime_serde")]
    pub slide_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub fade_in: Duration,
    #[serde(with = "humantime_serde")]
    pub fade_out: Duration,
    /// Trailing part of a slide during which the next one is already showing.
    #[serde(with = "humantime_serde")]
    pub overlap: Duration,
    /// Global playback speed multiplier.
    pub speed: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            slide_duration: timing.slide_duration,
            fade_in: timing.fade_in,
            fade_out: timing.fade_out,
            overlap: timing.overlap,
            speed: 1.0,
        }
    }
}

impl TimingConfig {
    pub fn timing(&self) -> Timing {
        Timing {
            slide_duration: self.slide_duration,
            fade_in: self.fade_in,
            fade_out: self.fade_out,
            overlap: self.overlap,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ProducerConfig {
    /// Wait after an image fails to load before trying the next one.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Wait when neither slot is free.
    #[serde(with = "humantime_serde")]
    pub idle_delay: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(100),
            idle_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PresenterConfig {
    /// Wait when there is nothing to upload or animate.
    #[serde(with = "humantime_serde")]
    pub idle_delay: Duration,
    /// Pacing between frames while a slide is on screen.
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
    /// Extra attempts for a tile upload before it is skipped.
    pub upload_retry_limit: u32,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(50),
            frame_interval: Duration::from_millis(16),
            upload_retry_limit: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root directory to scan recursively for images.
    pub photo_library_path: Option<PathBuf>,
    /// Explicit list of images with optional per-image durations.
    pub slideshow_file: Option<PathBuf>,
    /// Optional deterministic seed for the catalog shuffle and pan/zoom paths.
    pub startup_shuffle_seed: Option<u64>,
    pub geometry: GeometryConfig,
    pub timing: TimingConfig,
    pub producer: ProducerConfig,
    pub presenter: PresenterConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.photo_library_path.is_some() != self.slideshow_file.is_some(),
            "exactly one of photo-library-path or slideshow-file must be set"
        );
        self.geometry.tile_geometry()?;
        let t = &self.timing;
        ensure!(
            !t.slide_duration.is_zero(),
            "timing.slide-duration must be greater than zero"
        );
        ensure!(
            !t.fade_in.is_zero() && !t.fade_out.is_zero(),
            "timing.fade-in and timing.fade-out must be greater than zero"
        );
        ensure!(
            t.fade_in + t.fade_out <= t.slide_duration,
            "timing.fade-in + timing.fade-out must not exceed timing.slide-duration"
        );
        ensure!(
            t.overlap < t.slide_duration,
            "timing.overlap must be shorter than timing.slide-duration"
        );
        ensure!(
            t.speed.is_finite() && t.speed > 0.0,
            "timing.speed must be positive"
        );
        ensure!(
            !self.presenter.frame_interval.is_zero(),
            "presenter.frame-interval must be greater than zero"
        );
        Ok(self)
    }
}
