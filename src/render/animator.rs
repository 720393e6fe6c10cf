//! Pan/zoom/crossfade math for slides on screen.
//!
//! Positions are normalized focus points in image space (0.5, 0.5 is the
//! center) and `scale` is a zoom factor relative to fit. Everything here is a
//! pure function of elapsed time so the presenter can be driven with
//! simulated instants in tests.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::processing::geometry::{EDGE_SHRINK, TileGeometry};

/// Slide timing, in unscaled seconds of slide time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub slide_duration: Duration,
    pub fade_in: Duration,
    pub fade_out: Duration,
    pub overlap: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            slide_duration: Duration::from_secs(10),
            fade_in: Duration::from_millis(1500),
            fade_out: Duration::from_millis(1500),
            overlap: Duration::from_secs(2),
        }
    }
}

impl Timing {
    /// Opacity at `elapsed` seconds into a slide lasting `total` seconds.
    pub fn dissolve(&self, elapsed: f64, total: f64) -> f32 {
        let fade_in = self.fade_in.as_secs_f64();
        let fade_out = self.fade_out.as_secs_f64();
        let d = if elapsed < fade_in {
            elapsed / fade_in
        } else if elapsed > total - fade_out {
            (total - elapsed) / fade_out
        } else {
            1.0
        };
        d.clamp(0.0, 1.0) as f32
    }

    /// True once the companion slide should begin underneath this one.
    pub fn companion_due(&self, elapsed: f64, total: f64) -> bool {
        elapsed > total - self.overlap.as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub dissolve: f32,
}

impl Pose {
    /// Pose used for every displaying slide while paused.
    pub fn paused(vertical_offset: f64) -> Self {
        Self {
            x: 0.5,
            y: (0.5 + vertical_offset) as f32,
            scale: 1.0,
            dissolve: 1.0,
        }
    }
}

/// Linear pan/zoom path for one slide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideMotion {
    pub start_x: f64,
    pub start_y: f64,
    pub start_scale: f64,
    pub dx: f64,
    pub dy: f64,
    pub d_scale: f64,
    /// Slide length in seconds of slide time.
    pub total: f64,
    pub aspect_ratio: f64,
}

impl SlideMotion {
    /// Picks a randomized path. Slot 0 zooms in and slot 1 zooms out so that
    /// consecutive slides alternate; portrait images keep their focus in the
    /// upper middle where faces usually are.
    pub fn plan<R: Rng + ?Sized>(slot: usize, aspect_ratio: f64, total: f64, rng: &mut R) -> Self {
        let portrait = aspect_ratio < 1.0;
        let zoom_in = slot % 2 == 0;

        let ((sx, sy, ss), (ex, ey, es)) = match (zoom_in, portrait) {
            (true, true) => (
                (
                    rng.random_range(0.45..0.55),
                    rng.random_range(0.35..0.65),
                    0.8,
                ),
                (
                    rng.random_range(0.45..0.55),
                    rng.random_range(0.50..0.70),
                    1.0,
                ),
            ),
            (true, false) => (
                (0.5, 0.5, 1.0),
                (
                    rng.random_range(0.45..0.55),
                    rng.random_range(0.45..0.55),
                    1.2,
                ),
            ),
            (false, true) => (
                (
                    rng.random_range(0.45..0.55),
                    rng.random_range(0.50..0.70),
                    1.0,
                ),
                (
                    rng.random_range(0.45..0.55),
                    rng.random_range(0.35..0.65),
                    0.8,
                ),
            ),
            (false, false) => (
                (
                    rng.random_range(0.45..0.55),
                    rng.random_range(0.45..0.55),
                    1.2,
                ),
                (0.5, 0.5, 1.0),
            ),
        };

        Self {
            start_x: sx,
            start_y: sy,
            start_scale: ss,
            dx: (ex - sx) / total,
            dy: (ey - sy) / total,
            d_scale: (es - ss) / total,
            total,
            aspect_ratio,
        }
    }

    pub fn pose(&self, elapsed: f64, timing: &Timing) -> Pose {
        Pose {
            x: (self.start_x + self.dx * elapsed) as f32,
            y: (self.start_y + self.dy * elapsed) as f32,
            scale: (self.start_scale + self.d_scale * elapsed) as f32,
            dissolve: timing.dissolve(elapsed, self.total),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedPreset {
    Slow,
    Normal,
    Fast,
}

impl SpeedPreset {
    pub fn factor(self) -> f64 {
        match self {
            SpeedPreset::Slow => 0.5,
            SpeedPreset::Normal => 1.0,
            SpeedPreset::Fast => 5.0,
        }
    }
}

/// Start instant of one slide, plus its frozen elapsed time while paused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideClock {
    started: Instant,
    frozen: Option<f64>,
}

impl SlideClock {
    pub fn start(now: Instant) -> Self {
        Self {
            started: now,
            frozen: None,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Elapsed slide time in seconds at `speed`.
    pub fn elapsed(&self, now: Instant, speed: f64) -> f64 {
        self.frozen
            .unwrap_or_else(|| now.saturating_duration_since(self.started).as_secs_f64() * speed)
    }

    fn freeze(&mut self, now: Instant, speed: f64) {
        self.frozen = Some(self.elapsed(now, speed));
    }

    fn thaw(&mut self, now: Instant, speed: f64) {
        if let Some(elapsed) = self.frozen.take() {
            self.started = instant_before(now, elapsed / speed);
        }
    }

    /// Keeps elapsed slide time continuous across a speed change.
    fn rebase(&mut self, now: Instant, old: f64, new: f64) {
        if self.frozen.is_none() {
            let wall = now.saturating_duration_since(self.started).as_secs_f64();
            self.started = instant_before(now, wall * old / new);
        }
    }
}

fn instant_before(now: Instant, seconds: f64) -> Instant {
    now.checked_sub(Duration::from_secs_f64(seconds.max(0.0)))
        .unwrap_or(now)
}

/// Global playback state: speed multiplier, pause and the manual vertical
/// offset used while paused.
#[derive(Debug, Clone, PartialEq)]
pub struct Clock {
    speed: f64,
    paused: bool,
    offset_target: f64,
    offset: f64,
}

pub const NUDGE_STEP: f64 = 0.1;

impl Clock {
    pub fn new(speed: f64) -> Self {
        Self {
            speed,
            paused: false,
            offset_target: 0.0,
            offset: 0.0,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn elapsed(&self, slide: &SlideClock, now: Instant) -> f64 {
        slide.elapsed(now, self.speed)
    }

    pub fn set_speed<'a>(
        &mut self,
        speed: f64,
        now: Instant,
        slides: impl IntoIterator<Item = &'a mut SlideClock>,
    ) {
        if speed == self.speed || speed <= 0.0 {
            return;
        }
        for slide in slides {
            slide.rebase(now, self.speed, speed);
        }
        self.speed = speed;
    }

    pub fn pause<'a>(&mut self, now: Instant, slides: impl IntoIterator<Item = &'a mut SlideClock>) {
        if self.paused {
            return;
        }
        for slide in slides {
            slide.freeze(now, self.speed);
        }
        self.paused = true;
    }

    pub fn resume<'a>(&mut self, now: Instant, slides: impl IntoIterator<Item = &'a mut SlideClock>) {
        if !self.paused {
            return;
        }
        for slide in slides {
            slide.thaw(now, self.speed);
        }
        self.paused = false;
    }

    /// Moves the paused view target by `delta`; nudging while playing pauses.
    pub fn nudge<'a>(
        &mut self,
        delta: f64,
        now: Instant,
        slides: impl IntoIterator<Item = &'a mut SlideClock>,
    ) {
        self.pause(now, slides);
        self.offset_target += delta;
    }

    /// Eases the displayed offset a tenth of the way to its target.
    pub fn step_offset(&mut self) -> f64 {
        self.offset += (self.offset_target - self.offset) / 10.0;
        self.offset
    }
}

/// One tile's placement: `rect` is `[x0, y0, x1, y1]` in normalized image
/// space with y pointing up, `uv` the matching texture window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileQuad {
    pub tile: usize,
    pub rect: [f32; 4],
    pub uv: [f32; 4],
}

/// Quads for every tile in grid order. Tile row 0 is the top of the image.
/// Texture coordinates are inset by the edge shrink so bilinear sampling
/// never reaches into a neighbour's texels.
pub fn tile_quads(geometry: &TileGeometry) -> Vec<TileQuad> {
    let (nx, ny) = (geometry.tiles_x as f32, geometry.tiles_y as f32);
    let inset_u = (EDGE_SHRINK / geometry.tile_width as f64) as f32;
    let inset_v = (EDGE_SHRINK / geometry.tile_height as f64) as f32;
    let uv = [inset_u, inset_v, 1.0 - inset_u, 1.0 - inset_v];

    let mut quads = Vec::with_capacity(geometry.tile_count());
    for ty in 0..geometry.tiles_y {
        for tx in 0..geometry.tiles_x {
            let y0 = (geometry.tiles_y - 1 - ty) as f32 / ny;
            quads.push(TileQuad {
                tile: geometry.tile_index(tx, ty),
                rect: [tx as f32 / nx, y0, (tx + 1) as f32 / nx, y0 + 1.0 / ny],
                uv,
            });
        }
    }
    quads
}
