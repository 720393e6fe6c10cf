//! The two alternating slide slots and the handshake between the producer
//! thread and the presenter.
//!
//! Ownership of a slot moves by atomically swapping its [`SlotState`]; the
//! tile pixels sit behind a mutex that only the current owner locks, so the
//! lock is uncontended in practice.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::Error;
use crate::processing::geometry::TileGeometry;
use crate::processing::tiles::TileSet;

pub const SLOT_COUNT: usize = 2;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Free for the producer.
    Empty = 0,
    /// Producer is streaming rows into the tiles.
    Filling = 1,
    /// Tiles are complete and waiting for the presenter.
    ReadyForUpload = 2,
    /// Presenter is uploading tiles, one per tick.
    Uploading = 3,
    /// All tiles are on the device; waiting for `time_to_start`.
    Downloaded = 4,
    /// On screen.
    Animating = 5,
}

impl SlotState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Empty,
            1 => Self::Filling,
            2 => Self::ReadyForUpload,
            3 => Self::Uploading,
            4 => Self::Downloaded,
            _ => Self::Animating,
        }
    }

    /// Whether `self -> to` is one of the lifecycle edges.
    pub fn allows(self, to: SlotState) -> bool {
        use SlotState::*;
        matches!(
            (self, to),
            (Empty, Filling)
                | (Filling, ReadyForUpload)
                | (Filling, Empty)
                | (ReadyForUpload, Uploading)
                | (Uploading, Downloaded)
                | (Downloaded, Animating)
                | (Animating, Empty)
        )
    }
}

/// Boolean view of a slot, in the terms the lifecycle is usually described in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotFlags {
    pub ready: bool,
    pub in_use: bool,
    pub downloaded: bool,
    pub time_to_start: bool,
    pub displaying: bool,
}

/// Catalog and decode details that travel with a slide from the producer to
/// the presenter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducedSlide {
    pub path: PathBuf,
    pub display_name: String,
    /// Per-entry duration from a slideshow file, if any.
    pub duration: Option<Duration>,
    pub source_width: u32,
    pub source_height: u32,
}

impl ProducedSlide {
    pub fn aspect_ratio(&self) -> f64 {
        self.source_width as f64 / self.source_height.max(1) as f64
    }
}

#[derive(Debug)]
pub struct SlideSlot {
    index: usize,
    state: AtomicU8,
    time_to_start: AtomicBool,
    tiles: Mutex<TileSet>,
    produced: Mutex<Option<ProducedSlide>>,
}

impl SlideSlot {
    pub fn new(index: usize, geometry: TileGeometry) -> Self {
        Self {
            index,
            state: AtomicU8::new(SlotState::Empty as u8),
            time_to_start: AtomicBool::new(false),
            tiles: Mutex::new(TileSet::new(geometry)),
            produced: Mutex::new(None),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn flags(&self) -> SlotFlags {
        let time_to_start = self.time_to_start();
        let base = SlotFlags {
            time_to_start,
            ..SlotFlags::default()
        };
        match self.state() {
            SlotState::Empty => base,
            SlotState::Filling => SlotFlags {
                in_use: true,
                ..base
            },
            SlotState::ReadyForUpload => SlotFlags {
                ready: true,
                ..base
            },
            SlotState::Uploading => SlotFlags {
                ready: true,
                in_use: true,
                ..base
            },
            SlotState::Downloaded => SlotFlags {
                downloaded: true,
                ..base
            },
            SlotState::Animating => SlotFlags {
                downloaded: true,
                displaying: true,
                ..base
            },
        }
    }

    /// Moves the slot from `from` to `to`. Fails without side effects when the
    /// edge is not part of the lifecycle or the slot is not in `from`.
    pub fn transition(&self, from: SlotState, to: SlotState) -> Result<(), Error> {
        if !from.allows(to) {
            return Err(Error::SlotTransition {
                slot: self.index,
                from,
                to,
            });
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| Error::SlotTransition {
                slot: self.index,
                from: SlotState::from_u8(actual),
                to,
            })
    }

    /// Producer claim: `Empty -> Filling`.
    pub fn try_claim(&self) -> bool {
        self.transition(SlotState::Empty, SlotState::Filling).is_ok()
    }

    /// Ends the slide on screen: `Animating -> Empty`, dropping its start
    /// signal so the next image through this slot waits for a fresh one.
    pub fn retire(&self) -> Result<(), Error> {
        self.transition(SlotState::Animating, SlotState::Empty)?;
        self.time_to_start.store(false, Ordering::Release);
        Ok(())
    }

    pub fn time_to_start(&self) -> bool {
        self.time_to_start.load(Ordering::Acquire)
    }

    pub fn signal_start(&self) {
        self.time_to_start.store(true, Ordering::Release);
    }

    pub fn tiles(&self) -> MutexGuard<'_, TileSet> {
        self.tiles.lock().expect("slot tiles poisoned")
    }

    pub fn set_produced(&self, slide: ProducedSlide) {
        *self.produced.lock().expect("slot metadata poisoned") = Some(slide);
    }

    pub fn produced(&self) -> Option<ProducedSlide> {
        self.produced.lock().expect("slot metadata poisoned").clone()
    }
}

/// Both slots, shared between the producer thread and the presenter.
#[derive(Debug)]
pub struct SlotPair {
    slots: [SlideSlot; SLOT_COUNT],
}

impl SlotPair {
    pub fn new(geometry: TileGeometry) -> Self {
        Self {
            slots: [SlideSlot::new(0, geometry), SlideSlot::new(1, geometry)],
        }
    }

    pub fn get(&self, index: usize) -> &SlideSlot {
        &self.slots[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlideSlot> {
        self.slots.iter()
    }

    pub fn companion(index: usize) -> usize {
        (index + 1) % SLOT_COUNT
    }

    /// Claims an empty slot for the producer, preferring one that has
    /// already been told to start.
    pub fn claim_empty(&self) -> Option<&SlideSlot> {
        let (signalled, quiet): (Vec<&SlideSlot>, Vec<&SlideSlot>) =
            self.slots.iter().partition(|s| s.time_to_start());
        signalled
            .into_iter()
            .chain(quiet)
            .find(|slot| slot.try_claim())
    }
}
