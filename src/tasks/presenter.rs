//! Foreground consumer: uploads finished tiles (one per tick), starts and
//! retires slides, and computes each frame's poses.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::events::{Command, ViewerCommand};
use crate::gpu::TileDevice;
use crate::processing::geometry::TileGeometry;
use crate::render::animator::{Clock, Pose, SlideClock, SlideMotion, TileQuad, Timing, tile_quads};
use crate::slot::{SLOT_COUNT, SlotPair, SlotState};
use crate::tasks::catalog::Catalog;

#[derive(Debug, Clone)]
pub struct PresenterSettings {
    pub timing: Timing,
    pub speed: f64,
    pub upload_retry_limit: u32,
    pub idle_delay: Duration,
    pub frame_interval: Duration,
    pub seed: Option<u64>,
}

/// A slide on screen.
#[derive(Debug, Clone)]
struct Showing {
    clock: SlideClock,
    motion: SlideMotion,
    name: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct UploadProgress {
    next_tile: usize,
    failures: u32,
    skipped: usize,
}

/// One slide to draw this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub slot: usize,
    pub pose: Pose,
    pub name: String,
}

/// What one [`Presenter::tick`] did. Layers are in draw order: the slide
/// that started most recently is last so it ends up on top.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tick {
    pub uploaded_tile: Option<(usize, usize)>,
    pub started: Vec<usize>,
    pub finished: Vec<usize>,
    pub layers: Vec<Layer>,
}

impl Tick {
    pub fn did_work(&self) -> bool {
        self.uploaded_tile.is_some() || !self.started.is_empty() || !self.finished.is_empty()
    }
}

pub struct Presenter<D: TileDevice> {
    slots: Arc<SlotPair>,
    device: D,
    textures: Vec<Vec<D::Texture>>,
    quads: Vec<TileQuad>,
    timing: Timing,
    clock: Clock,
    retry_limit: u32,
    showing: [Option<Showing>; SLOT_COUNT],
    uploads: [UploadProgress; SLOT_COUNT],
    rng: StdRng,
    slides_shown: usize,
}

impl<D: TileDevice> Presenter<D> {
    /// Creates every tile texture up front and lets slot 0 start as soon as
    /// it is uploaded.
    pub fn new(
        slots: Arc<SlotPair>,
        mut device: D,
        geometry: TileGeometry,
        settings: &PresenterSettings,
    ) -> Result<Self, Error> {
        let mut textures = Vec::with_capacity(SLOT_COUNT);
        for slot in 0..SLOT_COUNT {
            let per_slot = (0..geometry.tile_count())
                .map(|tile| {
                    device.create_tile_texture(
                        &format!("slot{slot}-tile{tile}"),
                        geometry.tile_width,
                        geometry.tile_height,
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            textures.push(per_slot);
        }
        slots.get(0).signal_start();

        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            slots,
            device,
            textures,
            quads: tile_quads(&geometry),
            timing: settings.timing,
            clock: Clock::new(settings.speed),
            retry_limit: settings.upload_retry_limit,
            showing: [None, None],
            uploads: [UploadProgress::default(); SLOT_COUNT],
            rng,
            slides_shown: 0,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn texture(&self, slot: usize, tile: usize) -> &D::Texture {
        &self.textures[slot][tile]
    }

    pub fn quads(&self) -> &[TileQuad] {
        &self.quads
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Slides that have run to completion.
    pub fn slides_shown(&self) -> usize {
        self.slides_shown
    }

    pub fn tick(&mut self, now: Instant) -> Result<Tick, Error> {
        let mut tick = Tick {
            uploaded_tile: self.upload_step()?,
            ..Tick::default()
        };

        if !self.clock.is_paused() {
            for index in 0..SLOT_COUNT {
                if self.try_start(index, now)? {
                    tick.started.push(index);
                }
            }
        }

        for index in 0..SLOT_COUNT {
            if self.advance(index, now)? {
                tick.finished.push(index);
            }
        }

        if self.clock.is_paused() {
            self.clock.step_offset();
        }
        tick.layers = self.layers(now);
        trace!(layers = tick.layers.len(), "frame");
        Ok(tick)
    }

    /// Uploads at most one tile. Returns `(slot, tile)` when a tile was
    /// handled, whether it went through or was skipped.
    fn upload_step(&mut self) -> Result<Option<(usize, usize)>, Error> {
        for index in 0..SLOT_COUNT {
            let slot = self.slots.get(index);
            if slot.state() == SlotState::ReadyForUpload {
                slot.transition(SlotState::ReadyForUpload, SlotState::Uploading)?;
                self.uploads[index] = UploadProgress::default();
                debug!(slot = index, "upload started");
            }
        }

        let Some(index) =
            (0..SLOT_COUNT).find(|&i| self.slots.get(i).state() == SlotState::Uploading)
        else {
            return Ok(None);
        };

        let tile = self.uploads[index].next_tile;
        let result = {
            let tiles = self.slots.get(index).tiles();
            self.device
                .upload_tile(&self.textures[index][tile], tiles.tile(tile))
        };
        let progress = &mut self.uploads[index];
        match result {
            Ok(()) => {
                progress.next_tile += 1;
                progress.failures = 0;
            }
            Err(err) if progress.failures < self.retry_limit => {
                progress.failures += 1;
                warn!(slot = index, tile, attempt = progress.failures, "tile upload failed: {err}");
                return Ok(Some((index, tile)));
            }
            Err(err) => {
                warn!(slot = index, tile, "giving up on tile upload: {err}");
                progress.next_tile += 1;
                progress.failures = 0;
                progress.skipped += 1;
            }
        }

        if progress.next_tile == self.textures[index].len() {
            let skipped = progress.skipped;
            self.slots
                .get(index)
                .transition(SlotState::Uploading, SlotState::Downloaded)?;
            info!(slot = index, skipped, "upload finished");
        }
        Ok(Some((index, tile)))
    }

    fn try_start(&mut self, index: usize, now: Instant) -> Result<bool, Error> {
        let slot = self.slots.get(index);
        if slot.state() != SlotState::Downloaded || !slot.time_to_start() {
            return Ok(false);
        }
        slot.transition(SlotState::Downloaded, SlotState::Animating)?;

        let produced = slot.produced();
        let aspect = produced.as_ref().map_or(1.0, |p| p.aspect_ratio());
        let total = produced
            .as_ref()
            .and_then(|p| p.duration)
            .unwrap_or(self.timing.slide_duration)
            .as_secs_f64();
        let name = produced.map(|p| p.display_name).unwrap_or_default();
        let motion = SlideMotion::plan(index, aspect, total, &mut self.rng);
        info!(slot = index, name = %name, aspect, total, "slide started");
        self.showing[index] = Some(Showing {
            clock: SlideClock::start(now),
            motion,
            name,
        });
        Ok(true)
    }

    /// Signals the companion near the end of a slide and retires it once its
    /// time is up. Returns true when the slide finished.
    fn advance(&mut self, index: usize, now: Instant) -> Result<bool, Error> {
        if self.clock.is_paused() {
            return Ok(false);
        }
        let Some(showing) = &self.showing[index] else {
            return Ok(false);
        };
        let elapsed = self.clock.elapsed(&showing.clock, now);
        let total = showing.motion.total;

        if elapsed > total {
            self.slots.get(index).retire()?;
            self.showing[index] = None;
            self.slides_shown += 1;
            info!(slot = index, "slide finished");
            return Ok(true);
        }
        if self.timing.companion_due(elapsed, total) {
            let companion = self.slots.get(SlotPair::companion(index));
            if !companion.time_to_start() {
                debug!(slot = companion.index(), elapsed, "companion signalled");
                companion.signal_start();
            }
        }
        Ok(false)
    }

    fn layers(&self, now: Instant) -> Vec<Layer> {
        let mut on_screen: Vec<(usize, &Showing)> = self
            .showing
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
            .collect();
        on_screen.sort_by_key(|(_, s)| s.clock.started());
        on_screen
            .into_iter()
            .map(|(slot, s)| {
                let pose = if self.clock.is_paused() {
                    Pose::paused(self.clock.offset())
                } else {
                    s.motion
                        .pose(self.clock.elapsed(&s.clock, now), &self.timing)
                };
                Layer {
                    slot,
                    pose,
                    name: s.name.clone(),
                }
            })
            .collect()
    }

    /// Applies a control command. Returns false when the slideshow should stop.
    pub fn handle_command(&mut self, command: ViewerCommand, now: Instant) -> bool {
        let clocks = self.showing.iter_mut().flatten().map(|s| &mut s.clock);
        match command {
            ViewerCommand::TogglePause => {
                if self.clock.is_paused() {
                    self.clock.resume(now, clocks);
                    info!("resumed");
                } else {
                    self.clock.pause(now, clocks);
                    info!("paused");
                }
            }
            ViewerCommand::Nudge(delta) => {
                self.clock.nudge(delta, now, clocks);
                debug!(delta, "nudged paused view");
            }
            ViewerCommand::SetSpeed(preset) => {
                self.clock.set_speed(preset.factor(), now, clocks);
                info!(speed = self.clock.speed(), "speed changed");
            }
            ViewerCommand::Quit => {
                info!("quit requested");
                return false;
            }
        }
        true
    }
}

/// Drives the presenter until cancelled. Commands arrive from the control
/// thread and are drained without blocking on every iteration.
pub async fn run<D, C>(
    mut presenter: Presenter<D>,
    commands: Receiver<Command>,
    catalog: Arc<Mutex<C>>,
    settings: PresenterSettings,
    max_slides: Option<usize>,
    cancel: CancellationToken,
) -> Result<()>
where
    D: TileDevice,
    C: Catalog,
{
    info!("presenter started");
    while !cancel.is_cancelled() {
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Viewer(cmd) => {
                    if !presenter.handle_command(cmd, Instant::now()) {
                        cancel.cancel();
                    }
                }
                Command::Catalog(cmd) => {
                    debug!(?cmd, "catalog command");
                    catalog.lock().expect("catalog poisoned").apply(cmd);
                }
            }
        }

        let tick = presenter
            .tick(Instant::now())
            .context("presenter tick failed")?;

        if max_slides.is_some_and(|max| presenter.slides_shown() >= max) {
            info!(shown = presenter.slides_shown(), "slide limit reached");
            cancel.cancel();
            break;
        }

        let delay = if tick.did_work() {
            Duration::ZERO
        } else if !tick.layers.is_empty() {
            settings.frame_interval
        } else {
            settings.idle_delay
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!(shown = presenter.slides_shown(), "presenter stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{MemoryDevice, MemoryTexture};
    use crate::render::animator::SpeedPreset;
    use crate::slot::ProducedSlide;

    fn settings() -> PresenterSettings {
        PresenterSettings {
            timing: Timing::default(),
            speed: 1.0,
            upload_retry_limit: 1,
            idle_delay: Duration::from_millis(1),
            frame_interval: Duration::from_millis(1),
            seed: Some(9),
        }
    }

    fn setup() -> (Arc<SlotPair>, Presenter<MemoryDevice>) {
        let g = TileGeometry::new([8, 8], [16, 16]).unwrap();
        let slots = Arc::new(SlotPair::new(g));
        let p = Presenter::new(Arc::clone(&slots), MemoryDevice::new(), g, &settings()).unwrap();
        (slots, p)
    }

    fn make_ready(slots: &SlotPair, index: usize, name: &str) {
        let slot = slots.get(index);
        assert!(slot.try_claim());
        slot.set_produced(ProducedSlide {
            path: name.into(),
            display_name: name.into(),
            duration: None,
            source_width: 400,
            source_height: 300,
        });
        slot.transition(SlotState::Filling, SlotState::ReadyForUpload)
            .unwrap();
    }

    #[test]
    fn uploads_one_tile_per_tick() {
        let (slots, mut p) = setup();
        make_ready(&slots, 0, "a");
        let t0 = Instant::now();
        let mut last = Tick::default();
        for tile in 0..4 {
            assert_eq!(slots.get(0).state(), if tile == 0 {
                SlotState::ReadyForUpload
            } else {
                SlotState::Uploading
            });
            last = p.tick(t0).unwrap();
            assert_eq!(last.uploaded_tile, Some((0, tile)));
            assert_eq!(p.device().upload_count(), tile + 1);
        }
        // slot 0 is signalled at startup, so it starts as soon as the last tile lands
        assert_eq!(last.started, vec![0]);
        assert_eq!(slots.get(0).state(), SlotState::Animating);
        assert_eq!(last.layers.len(), 1);
        assert_eq!(last.layers[0].name, "a");
        assert!(p.tick(t0).unwrap().uploaded_tile.is_none());
    }

    #[test]
    fn retries_then_skips_failed_tile() {
        let (slots, mut p) = setup();
        make_ready(&slots, 0, "a");
        let tex = *p.texture(0, 1);
        assert_eq!(tex, MemoryTexture(1));
        p.device.fail_uploads(tex, 5);
        let t0 = Instant::now();
        let handled: Vec<_> = (0..5)
            .map(|_| p.tick(t0).unwrap().uploaded_tile.unwrap().1)
            .collect();
        // tile 1 fails, is retried once, then skipped
        assert_eq!(handled, vec![0, 1, 1, 2, 3]);
        assert_eq!(slots.get(0).state(), SlotState::Downloaded);
        assert_eq!(p.device().upload_count(), 3);
    }

    #[test]
    fn crossfade_overlaps_and_orders_layers() {
        let (slots, mut p) = setup();
        make_ready(&slots, 0, "first");
        make_ready(&slots, 1, "second");
        let t0 = Instant::now();
        for _ in 0..3 {
            p.tick(t0).unwrap();
        }
        assert_eq!(p.tick(t0).unwrap().started, vec![0]);
        for _ in 0..4 {
            assert!(p.tick(t0).unwrap().started.is_empty());
        }
        assert_eq!(slots.get(1).state(), SlotState::Downloaded);
        assert!(!slots.get(1).time_to_start());

        let at = |s: f64| t0 + Duration::from_secs_f64(s);
        p.tick(at(7.9)).unwrap();
        assert!(!slots.get(1).time_to_start());
        let tick = p.tick(at(8.05)).unwrap();
        assert!(slots.get(1).time_to_start());
        assert!(tick.started.is_empty());

        let tick = p.tick(at(8.1)).unwrap();
        assert_eq!(tick.started, vec![1]);
        let order: Vec<usize> = tick.layers.iter().map(|l| l.slot).collect();
        assert_eq!(order, vec![0, 1]);

        let tick = p.tick(at(10.2)).unwrap();
        assert_eq!(tick.finished, vec![0]);
        assert_eq!(slots.get(0).state(), SlotState::Empty);
        assert!(!slots.get(0).time_to_start());
        assert_eq!(tick.layers.len(), 1);
        assert_eq!(p.slides_shown(), 1);
    }

    #[test]
    fn paused_slides_do_not_end() {
        let (slots, mut p) = setup();
        make_ready(&slots, 0, "a");
        let t0 = Instant::now();
        for _ in 0..5 {
            p.tick(t0).unwrap();
        }
        assert!(p.handle_command(ViewerCommand::TogglePause, t0 + Duration::from_secs(1)));
        let tick = p.tick(t0 + Duration::from_secs(60)).unwrap();
        assert!(tick.finished.is_empty());
        assert_eq!(tick.layers[0].pose.scale, 1.0);
        assert_eq!(tick.layers[0].pose.dissolve, 1.0);

        p.handle_command(ViewerCommand::TogglePause, t0 + Duration::from_secs(60));
        let tick = p.tick(t0 + Duration::from_secs(66)).unwrap();
        assert!(tick.finished.is_empty());
        let tick = p.tick(t0 + Duration::from_secs(70)).unwrap();
        assert_eq!(tick.finished, vec![0]);
    }

    #[test]
    fn speed_and_quit_commands() {
        let (_slots, mut p) = setup();
        let now = Instant::now();
        assert!(p.handle_command(ViewerCommand::SetSpeed(SpeedPreset::Slow), now));
        assert_eq!(p.clock().speed(), 0.5);
        assert!(!p.handle_command(ViewerCommand::Quit, now));
    }

    #[tokio::test]
    async fn run_stops_after_slide_limit() {
        use crate::tasks::catalog::{CatalogEntry, Direction};
        use crate::events::CatalogCommand;

        struct NoCatalog;
        impl Catalog for NoCatalog {
            fn next_entry(&mut self) -> Option<CatalogEntry> {
                None
            }
            fn set_direction(&mut self, _: Direction) {}
            fn apply(&mut self, _: CatalogCommand) {}
        }

        let (slots, p) = setup();
        make_ready(&slots, 0, "a");
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(Command::Viewer(ViewerCommand::SetSpeed(SpeedPreset::Fast)))
            .unwrap();
        let mut s = settings();
        s.timing.slide_duration = Duration::from_millis(200);
        s.timing.fade_in = Duration::from_millis(50);
        s.timing.fade_out = Duration::from_millis(50);
        s.timing.overlap = Duration::from_millis(50);
        let mut p = p;
        p.timing = s.timing;
        let cancel = CancellationToken::new();
        tokio::time::timeout(
            Duration::from_secs(10),
            run(p, rx, Arc::new(Mutex::new(NoCatalog)), s, Some(1), cancel.clone()),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(slots.get(0).state(), SlotState::Empty);
    }
}
