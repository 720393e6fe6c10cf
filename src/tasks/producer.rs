//! Background production: decode the next catalog image, resample it into
//! the free slot's tiles, and hand the slot to the presenter.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::processing::contrib::{Axis, ContributionCache};
use crate::processing::geometry::{BYTES_PER_PIXEL, TileGeometry};
use crate::processing::row::scale_row;
use crate::processing::vertical::VerticalScaler;
use crate::slot::{ProducedSlide, SLOT_COUNT, SlotPair, SlotState};
use crate::tasks::catalog::{Catalog, CatalogEntry};
use crate::tasks::loader::{ImageLoader, RowSource};

#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub retry_delay: Duration,
    pub idle_delay: Duration,
    /// Write every produced slide as a PNG into this directory.
    pub dump_tiles: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Filled,
    Abandoned,
}

pub struct Producer<C, L> {
    slots: Arc<SlotPair>,
    catalog: Arc<Mutex<C>>,
    loader: L,
    cache: Arc<ContributionCache>,
    geometry: TileGeometry,
    scalers: Vec<VerticalScaler>,
    source_row: Vec<u8>,
    settings: ProducerSettings,
    cancel: CancellationToken,
    produced: usize,
}

impl<C, L> Producer<C, L>
where
    C: Catalog,
    L: ImageLoader,
{
    pub fn new(
        slots: Arc<SlotPair>,
        catalog: Arc<Mutex<C>>,
        loader: L,
        cache: Arc<ContributionCache>,
        geometry: TileGeometry,
        settings: ProducerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            slots,
            catalog,
            loader,
            cache,
            geometry,
            scalers: (0..SLOT_COUNT)
                .map(|_| VerticalScaler::new(geometry))
                .collect(),
            source_row: Vec::new(),
            settings,
            cancel,
            produced: 0,
        }
    }

    /// Keeps both slots filled until cancelled.
    pub fn run(mut self) -> Result<()> {
        info!("producer started");
        while !self.cancel.is_cancelled() {
            let claimed = self.slots.claim_empty().map(|slot| slot.index());
            match claimed {
                Some(index) => {
                    debug!(slot = index, "claimed slot");
                    self.fill_slot(index)
                        .with_context(|| format!("filling slot {index}"))?;
                }
                None => thread::sleep(self.settings.idle_delay),
            }
        }
        info!(produced = self.produced, "producer stopped");
        Ok(())
    }

    /// Fills a slot the caller has already claimed (`Filling`). Unreadable
    /// images are skipped after `retry_delay`. On cancellation the slot goes
    /// back to `Empty`.
    pub fn fill_slot(&mut self, index: usize) -> Result<FillOutcome, Error> {
        loop {
            if self.cancel.is_cancelled() {
                return self.abandon(index);
            }
            let entry = self
                .catalog
                .lock()
                .expect("catalog poisoned")
                .next_entry()
                .ok_or(Error::EmptyCatalog)?;

            match self.load_into(index, &entry) {
                Ok(slide) => {
                    info!(
                        slot = index,
                        path = %slide.path.display(),
                        width = slide.source_width,
                        height = slide.source_height,
                        "slide ready for upload"
                    );
                    let slot = self.slots.get(index);
                    slot.set_produced(slide);
                    self.dump(index);
                    slot.transition(SlotState::Filling, SlotState::ReadyForUpload)?;
                    self.produced += 1;
                    return Ok(FillOutcome::Filled);
                }
                Err(Error::Cancelled) => return self.abandon(index),
                Err(err) => {
                    warn!(slot = index, path = %entry.path.display(), "skipping image: {err}");
                    thread::sleep(self.settings.retry_delay);
                }
            }
        }
    }

    fn abandon(&self, index: usize) -> Result<FillOutcome, Error> {
        debug!(slot = index, "abandoning fill");
        self.slots
            .get(index)
            .transition(SlotState::Filling, SlotState::Empty)?;
        Ok(FillOutcome::Abandoned)
    }

    /// Streams one image through the horizontal and vertical passes into the
    /// slot's tiles.
    fn load_into(&mut self, index: usize, entry: &CatalogEntry) -> Result<ProducedSlide, Error> {
        let mut source = self.loader.open(&entry.path)?;
        let (width, height) = (source.width() as usize, source.height() as usize);

        let horizontal = self.cache.table(
            Axis::Horizontal,
            width,
            self.geometry.texture_width(),
            self.geometry.tile_width as usize,
        );
        let scaler = &mut self.scalers[index];
        scaler.begin_image(height, &self.cache);
        self.source_row.resize(width * BYTES_PER_PIXEL, 0);

        let mut tiles = self.slots.get(index).tiles();
        for y in 0..height {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            source.read_row(y as u32, &mut self.source_row)?;
            scale_row(&horizontal, &self.source_row, scaler.row_buffer(y)?);
            scaler.process_row(y, &mut tiles)?;
        }

        Ok(ProducedSlide {
            path: entry.path.clone(),
            display_name: entry.display_name.clone(),
            duration: entry.duration,
            source_width: width as u32,
            source_height: height as u32,
        })
    }

    fn dump(&self, index: usize) {
        let Some(dir) = &self.settings.dump_tiles else {
            return;
        };
        let path = dir.join(format!("slide-{:04}-slot{index}.png", self.produced));
        match self.slots.get(index).tiles().compose().save(&path) {
            Ok(()) => debug!(path = %path.display(), "dumped tiles"),
            Err(err) => warn!(path = %path.display(), "failed to dump tiles: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CatalogCommand;
    use crate::tasks::catalog::Direction;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    use crate::tasks::loader::DecodedImage;

    struct ListCatalog(Vec<&'static str>, usize);

    impl Catalog for ListCatalog {
        fn next_entry(&mut self) -> Option<CatalogEntry> {
            let name = *self.0.get(self.1 % self.0.len().max(1))?;
            self.1 += 1;
            Some(CatalogEntry {
                path: PathBuf::from(name),
                display_name: name.to_string(),
                duration: None,
            })
        }
        fn set_direction(&mut self, _: Direction) {}
        fn apply(&mut self, _: CatalogCommand) {}
    }

    /// Serves a flat grey image for every path except ones named "bad".
    struct FlatLoader;

    impl ImageLoader for FlatLoader {
        type Source = DecodedImage;

        fn open(&self, path: &Path) -> Result<DecodedImage, Error> {
            if path == Path::new("bad") {
                return Err(Error::Decode {
                    path: path.to_path_buf(),
                    message: "corrupt".into(),
                });
            }
            Ok(DecodedImage::new(RgbImage::from_pixel(90, 60, Rgb([128, 128, 128]))))
        }
    }

    fn producer(names: Vec<&'static str>) -> Producer<ListCatalog, FlatLoader> {
        let geometry = TileGeometry::new([16, 16], [32, 32]).unwrap();
        Producer::new(
            Arc::new(SlotPair::new(geometry)),
            Arc::new(Mutex::new(ListCatalog(names, 0))),
            FlatLoader,
            Arc::new(ContributionCache::new()),
            geometry,
            ProducerSettings {
                retry_delay: Duration::from_millis(1),
                idle_delay: Duration::from_millis(1),
                dump_tiles: None,
            },
            CancellationToken::new(),
        )
    }

    #[test]
    fn fills_claimed_slot_and_marks_ready() {
        let mut p = producer(vec!["a.jpg"]);
        let slot = p.slots.claim_empty().unwrap().index();
        assert_eq!(p.fill_slot(slot).unwrap(), FillOutcome::Filled);
        let s = p.slots.get(slot);
        assert_eq!(s.state(), SlotState::ReadyForUpload);
        let produced = s.produced().unwrap();
        assert_eq!((produced.source_width, produced.source_height), (90, 60));
        let tiles = s.tiles();
        assert_eq!(tiles.texel(0, 0)[3], 0);
        let centre = tiles.texel(16, 16);
        assert_eq!(centre[3], 255);
        assert!((centre[0] as i32 - 128).abs() <= 3, "{centre:?}");
    }

    #[test]
    fn skips_unreadable_images() {
        let mut p = producer(vec!["bad", "good.jpg"]);
        let slot = p.slots.claim_empty().unwrap().index();
        p.fill_slot(slot).unwrap();
        assert_eq!(
            p.slots.get(slot).produced().unwrap().path,
            PathBuf::from("good.jpg")
        );
    }

    #[test]
    fn cancellation_returns_slot_to_empty() {
        let mut p = producer(vec!["a.jpg"]);
        let slot = p.slots.claim_empty().unwrap().index();
        p.cancel.cancel();
        assert_eq!(p.fill_slot(slot).unwrap(), FillOutcome::Abandoned);
        assert_eq!(p.slots.get(slot).state(), SlotState::Empty);
    }

    #[test]
    fn dumps_composed_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = producer(vec!["a.jpg"]);
        p.settings.dump_tiles = Some(dir.path().to_path_buf());
        let slot = p.slots.claim_empty().unwrap().index();
        p.fill_slot(slot).unwrap();
        let dumped = image::open(dir.path().join("slide-0000-slot0.png")).unwrap();
        assert_eq!((dumped.width(), dumped.height()), (32, 32));
    }
}
