//! Incremental vertical pass.
//!
//! Source rows arrive one at a time, already resampled horizontally to the
//! texture width. Each row lands in a small circular buffer; as soon as every
//! source row a destination row depends on has arrived, that destination row
//! is filtered and written straight into its tile. Memory therefore depends
//! on the filter footprint, not on the source height.

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::Error;
use crate::processing::contrib::{Axis, ContributionCache, ContributionTable};
use crate::processing::geometry::{BYTES_PER_PIXEL, BYTES_PER_TEXEL, TileGeometry, locate};
use crate::processing::row::clamp_channel;
use crate::processing::tiles::TileSet;

/// What a call to [`VerticalScaler::process_row`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowProgress {
    /// Destination rows written by this call.
    pub emitted: Range<usize>,
    /// The last source row arrived and the outer border was masked.
    pub finished: bool,
}

#[derive(Debug)]
pub struct VerticalScaler {
    geometry: TileGeometry,
    source_height: usize,
    table: Option<Arc<ContributionTable>>,
    /// `unblocked[y]`: every destination row below this index is computable
    /// once source rows `0..=y` have arrived.
    unblocked: Vec<usize>,
    next_destination_row: usize,
    next_source_row: usize,
    capacity: usize,
    rows: Vec<u8>,
    resident: Vec<Option<usize>>,
    /// `(buffer offset, weight)` per tap of the row being emitted.
    taps: Vec<(usize, f64)>,
}

impl VerticalScaler {
    pub fn new(geometry: TileGeometry) -> Self {
        Self {
            geometry,
            source_height: 0,
            table: None,
            unblocked: Vec::new(),
            next_destination_row: 0,
            next_source_row: 0,
            capacity: 0,
            rows: Vec::new(),
            resident: Vec::new(),
            taps: Vec::new(),
        }
    }

    /// Prepares for a new image of `source_height` rows. The emission
    /// schedule and buffer size are recomputed only when the height changes;
    /// the row buffer only ever grows.
    pub fn begin_image(&mut self, source_height: usize, cache: &ContributionCache) {
        assert!(source_height > 0, "source image must have at least one row");
        self.next_destination_row = 0;
        self.next_source_row = 0;

        if self.table.is_some() && self.source_height == source_height {
            self.resident.fill(None);
            return;
        }

        let texture_height = self.geometry.texture_height();
        let table = cache.table(
            Axis::Vertical,
            source_height,
            texture_height,
            self.geometry.tile_height as usize,
        );

        self.unblocked = unblocked_schedule(&table, source_height);
        self.capacity = required_capacity(&table, &self.unblocked).min(source_height);

        let needed = self.capacity * self.row_stride();
        if self.rows.len() < needed {
            self.rows.resize(needed, 0);
        }
        self.resident.clear();
        self.resident.resize(self.capacity, None);
        self.source_height = source_height;
        self.table = Some(table);

        debug!(
            source_height,
            rows = self.capacity,
            "using circular input buffer"
        );
    }

    /// Rows held by the circular buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Destination rows emitted so far for the current image.
    pub fn emitted_rows(&self) -> usize {
        self.next_destination_row
    }

    /// Destination rows computable once source row `source_row` has arrived.
    pub fn unblocked_through(&self, source_row: usize) -> usize {
        self.unblocked[source_row]
    }

    pub fn table(&self) -> Option<&Arc<ContributionTable>> {
        self.table.as_ref()
    }

    fn row_stride(&self) -> usize {
        self.geometry.texture_width() * BYTES_PER_PIXEL
    }

    /// Buffer slot the caller fills with horizontally resampled source row
    /// `source_row` (texture-width RGB pixels).
    pub fn row_buffer(&mut self, source_row: usize) -> Result<&mut [u8], Error> {
        if self.table.is_none() {
            return Err(Error::ScalerNotReady);
        }
        let slot = source_row % self.capacity;
        self.resident[slot] = Some(source_row);
        let stride = self.row_stride();
        Ok(&mut self.rows[slot * stride..(slot + 1) * stride])
    }

    /// Emits every destination row that `source_row` unblocks. Rows must
    /// arrive in increasing order starting at zero. Processing the final
    /// source row masks the outer border of the tile grid.
    pub fn process_row(
        &mut self,
        source_row: usize,
        tiles: &mut TileSet,
    ) -> Result<RowProgress, Error> {
        let Some(table) = self.table.clone() else {
            return Err(Error::ScalerNotReady);
        };
        if source_row != self.next_source_row {
            return Err(Error::RowOutOfOrder {
                expected: self.next_source_row,
                got: source_row,
            });
        }
        if self.resident[source_row % self.capacity] != Some(source_row) {
            return Err(Error::RowNotResident(source_row));
        }

        let start = self.next_destination_row;
        let end = self.unblocked[source_row];
        for dst_y in start..end {
            self.emit_row(&table, dst_y, tiles)?;
        }
        self.next_destination_row = end;
        self.next_source_row += 1;

        let finished = source_row + 1 == self.source_height;
        if finished {
            debug_assert_eq!(end, self.geometry.texture_height());
            tiles.mask_outer_border();
            trace!(source_row, "vertical pass finished");
        }

        Ok(RowProgress {
            emitted: start..end,
            finished,
        })
    }

    fn emit_row(
        &mut self,
        table: &ContributionTable,
        dst_y: usize,
        tiles: &mut TileSet,
    ) -> Result<(), Error> {
        let stride = self.row_stride();
        self.taps.clear();
        for tap in table.taps(dst_y) {
            let slot = tap.source % self.capacity;
            if self.resident[slot] != Some(tap.source) {
                return Err(Error::RowNotResident(tap.source));
            }
            self.taps.push((slot * stride, tap.weight));
        }

        let tile_width = self.geometry.tile_width as usize;
        let (ty, local_y) = locate(dst_y, self.geometry.tile_height as usize);
        for tx in 0..self.geometry.tiles_x {
            let tile = self.geometry.tile_index(tx, ty as u32);
            let out = tiles.tile_row_mut(tile, local_y);
            let src_x0 = tx as usize * tile_width;
            for (x, texel) in out.chunks_exact_mut(BYTES_PER_TEXEL).enumerate() {
                let column = (src_x0 + x) * BYTES_PER_PIXEL;
                let (mut r, mut g, mut b) = (0.0, 0.0, 0.0);
                for &(base, weight) in &self.taps {
                    let s = &self.rows[base + column..base + column + BYTES_PER_PIXEL];
                    r += s[0] as f64 * weight;
                    g += s[1] as f64 * weight;
                    b += s[2] as f64 * weight;
                }
                texel[0] = clamp_channel(r);
                texel[1] = clamp_channel(g);
                texel[2] = clamp_channel(b);
                texel[3] = 255;
            }
        }
        Ok(())
    }
}

/// For each source row, the first destination row that still needs a source
/// row not yet seen.
fn unblocked_schedule(table: &ContributionTable, source_height: usize) -> Vec<usize> {
    let mut schedule = Vec::with_capacity(source_height);
    let mut blocked = 0;
    for src_y in 0..source_height {
        while blocked < table.len() && table.max_source(blocked).is_none_or(|max| max <= src_y) {
            blocked += 1;
        }
        schedule.push(blocked);
    }
    schedule
}

/// Replays the emission schedule and returns the largest distance between the
/// newest arrived row and the oldest row still referenced.
fn required_capacity(table: &ContributionTable, schedule: &[usize]) -> usize {
    let mut capacity = 1;
    let mut start = 0;
    for (src_y, &end) in schedule.iter().enumerate() {
        for dst_y in start..end {
            for tap in table.taps(dst_y) {
                capacity = capacity.max(src_y - tap.source + 1);
            }
        }
        start = end;
    }
    capacity
}
