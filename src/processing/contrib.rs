//! Per-axis contribution tables: for every destination texel, the source
//! samples (and their Lanczos weights) that are blended into it.
//!
//! Destination positions are computed in the tile-aware effective space
//! (see [`effective_position`]) so every tile is resampled as if it were
//! `EDGE_SHRINK` smaller on each side, and neighbouring tiles repeat their
//! seam texel. Taps that fall off either end of the source are mirrored back
//! into range instead of clamped, which keeps edges from darkening.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::processing::filter::{LANCZOS_SUPPORT, lanczos3};
use crate::processing::geometry::{effective_length, effective_position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// One filter tap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap {
    pub source: usize,
    pub weight: f64,
}

/// Immutable table of taps for one axis and one geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributionTable {
    source_len: usize,
    max_contributors: usize,
    offsets: Vec<usize>,
    taps: Vec<Tap>,
}

impl ContributionTable {
    /// Builds the table mapping `source_len` samples onto `destination_len`
    /// texels split into tiles of `tile_len`.
    ///
    /// Weights are not renormalized; when shrinking, the kernel is widened by
    /// `1 / scale` and scaled down by the same factor.
    pub fn build(source_len: usize, destination_len: usize, tile_len: usize) -> Self {
        assert!(source_len > 0, "contribution table needs a non-empty source");
        assert!(
            tile_len > 0 && destination_len >= tile_len,
            "contribution table needs at least one whole tile"
        );

        let effective = effective_length(destination_len, tile_len);
        let scale = effective as f64 / source_len as f64;
        let shrinking = scale < 1.0;
        let width = if shrinking {
            LANCZOS_SUPPORT / scale
        } else {
            LANCZOS_SUPPORT
        };
        let max_contributors = (width * 2.0 + 1.0) as usize;

        let mut offsets = Vec::with_capacity(destination_len + 1);
        let mut taps = Vec::with_capacity(destination_len * max_contributors);
        offsets.push(0);

        for i in 0..destination_len {
            let center = effective_position(i, tile_len) / scale;
            let left = (center - width).ceil() as i64;
            let right = (center + width).floor() as i64;
            let mut n = 0;
            for j in left..=right {
                if n >= max_contributors {
                    break;
                }
                let distance = center - j as f64;
                let weight = if shrinking {
                    lanczos3(distance * scale) * scale
                } else {
                    lanczos3(distance)
                };
                if weight != 0.0 {
                    taps.push(Tap {
                        source: reflect(j, source_len),
                        weight,
                    });
                    n += 1;
                }
            }
            offsets.push(taps.len());
        }

        Self {
            source_len,
            max_contributors,
            offsets,
            taps,
        }
    }

    /// Number of destination texels.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// Upper bound on taps per destination texel.
    pub fn max_contributors(&self) -> usize {
        self.max_contributors
    }

    /// Taps for destination texel `index`, in ascending source-position order
    /// before reflection.
    #[inline]
    pub fn taps(&self, index: usize) -> &[Tap] {
        &self.taps[self.offsets[index]..self.offsets[index + 1]]
    }

    /// Highest source index referenced by destination texel `index`.
    pub fn max_source(&self, index: usize) -> Option<usize> {
        self.taps(index).iter().map(|t| t.source).max()
    }
}

/// Mirrors an out-of-range sample index back into `[0, len)`. Loops because a
/// filter wider than the source can bounce off both ends.
pub fn reflect(mut index: i64, len: usize) -> usize {
    let len = len as i64;
    loop {
        if index < 0 {
            index = -index;
        } else if index >= len {
            index = (len - index) + len - 1;
        } else {
            return index as usize;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TableKey {
    axis: Axis,
    destination_len: usize,
    tile_len: usize,
}

/// Memo of contribution tables owned by the pipeline and shared with the
/// producer. Holds at most one table per axis and destination geometry: a
/// request for a different source length replaces the stored table, so the
/// footprint does not depend on how many image sizes pass through.
#[derive(Debug, Default)]
pub struct ContributionCache {
    tables: Mutex<HashMap<TableKey, Arc<ContributionTable>>>,
}

impl ContributionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table for this geometry and source length, rebuilding the
    /// stored one when the source length changed since the last request.
    pub fn table(
        &self,
        axis: Axis,
        source_len: usize,
        destination_len: usize,
        tile_len: usize,
    ) -> Arc<ContributionTable> {
        let key = TableKey {
            axis,
            destination_len,
            tile_len,
        };
        let mut tables = self
            .tables
            .lock()
            .expect("contribution cache poisoned");
        if let Some(hit) = tables.get(&key).filter(|t| t.source_len() == source_len) {
            return Arc::clone(hit);
        }
        let table = Arc::new(ContributionTable::build(
            source_len,
            destination_len,
            tile_len,
        ));
        let replaced = tables.insert(key, Arc::clone(&table));
        debug!(
            ?axis,
            source_len,
            destination_len,
            max_contributors = table.max_contributors(),
            replaced_source_len = ?replaced.map(|t| t.source_len()),
            "built contribution table"
        );
        table
    }

    /// Stored tables, at most one per axis and destination geometry.
    pub fn len(&self) -> usize {
        self.tables
            .lock()
            .expect("contribution cache poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_mirrors_at_both_ends() {
        assert_eq!(reflect(-1, 10), 1);
        assert_eq!(reflect(-3, 10), 3);
        assert_eq!(reflect(10, 10), 9);
        assert_eq!(reflect(11, 10), 8);
        assert_eq!(reflect(5, 10), 5);
    }

    #[test]
    fn reflect_bounces_repeatedly_on_tiny_sources() {
        for len in 1..5usize {
            for index in -20..20i64 {
                let r = reflect(index, len);
                assert!(r < len, "reflect({index}, {len}) = {r}");
            }
        }
    }

    #[test]
    fn builds_identical_tables_for_same_inputs() {
        let a = ContributionTable::build(4000, 1024, 256);
        let b = ContributionTable::build(4000, 1024, 256);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1024);
    }

    #[test]
    fn shrinking_widens_support() {
        let shrink = ContributionTable::build(4000, 1024, 256);
        let enlarge = ContributionTable::build(300, 1024, 256);
        assert!(shrink.max_contributors() > enlarge.max_contributors());
        assert_eq!(enlarge.max_contributors(), 7);
        for i in 0..shrink.len() {
            assert!(shrink.taps(i).len() <= shrink.max_contributors());
        }
    }

    #[test]
    fn magnified_tiny_source_stays_in_range() {
        let table = ContributionTable::build(4, 512, 256);
        for i in 0..table.len() {
            assert!(!table.taps(i).is_empty());
            for tap in table.taps(i) {
                assert!(tap.source < 4, "dst {i} references {}", tap.source);
            }
        }
    }

    #[test]
    fn weights_roughly_preserve_flat_fields() {
        let table = ContributionTable::build(1500, 1024, 256);
        for i in 0..table.len() {
            let sum: f64 = table.taps(i).iter().map(|t| t.weight).sum();
            assert!((sum - 1.0).abs() < 0.05, "dst {i} sums to {sum}");
        }
    }

    #[test]
    fn seam_texels_share_taps() {
        let table = ContributionTable::build(2000, 1024, 256);
        assert_eq!(table.taps(255), table.taps(256));
        assert_eq!(table.taps(511), table.taps(512));
    }

    #[test]
    fn cache_returns_shared_instance() {
        let cache = ContributionCache::new();
        let a = cache.table(Axis::Vertical, 3000, 1024, 256);
        let b = cache.table(Axis::Vertical, 3000, 1024, 256);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let h = cache.table(Axis::Horizontal, 3000, 1024, 256);
        assert!(!Arc::ptr_eq(&a, &h));
        assert_eq!(*a, *h);
        assert_eq!(cache.len(), 2);

        // a new source length replaces the stored vertical table
        let other = cache.table(Axis::Vertical, 2000, 1024, 256);
        assert_ne!(*a, *other);
        assert_eq!(other.source_len(), 2000);
        assert_eq!(cache.len(), 2);
        let again = cache.table(Axis::Vertical, 2000, 1024, 256);
        assert!(Arc::ptr_eq(&other, &again));
        // tables handed out earlier stay valid
        assert_eq!(a.source_len(), 3000);
    }

    #[test]
    fn cache_stays_bounded_across_image_sizes() {
        let cache = ContributionCache::new();
        for i in 0..300 {
            let (width, height) = (3000 + 7 * i, 2000 + 5 * i);
            let h = cache.table(Axis::Horizontal, width, 1024, 256);
            let v = cache.table(Axis::Vertical, height, 1024, 256);
            assert_eq!(h.source_len(), width);
            assert_eq!(v.source_len(), height);
            assert_eq!(cache.len(), 2, "after {} sizes", i + 1);
        }
        cache.table(Axis::Vertical, 500, 512, 128);
        assert_eq!(cache.len(), 3);
    }
}
