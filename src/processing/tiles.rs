use image::RgbaImage;

use crate::processing::geometry::{BYTES_PER_TEXEL, TRANSPARENT_BORDER_WIDTH, TileGeometry};

const ALPHA: usize = 3;

/// CPU-side RGBA storage for every tile of one slide, row-major by tile.
/// Allocated once per slot and reused for every image that passes through it.
#[derive(Debug, Clone)]
pub struct TileSet {
    geometry: TileGeometry,
    tiles: Vec<Vec<u8>>,
}

impl TileSet {
    pub fn new(geometry: TileGeometry) -> Self {
        let tiles = (0..geometry.tile_count())
            .map(|_| vec![0u8; geometry.tile_bytes()])
            .collect();
        Self { geometry, tiles }
    }

    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, index: usize) -> &[u8] {
        &self.tiles[index]
    }

    /// Mutable slice covering row `y` of tile `index`.
    pub fn tile_row_mut(&mut self, index: usize, y: usize) -> &mut [u8] {
        let stride = self.geometry.tile_width as usize * BYTES_PER_TEXEL;
        let start = y * stride;
        &mut self.tiles[index][start..start + stride]
    }

    /// Texel at global texture coordinates.
    pub fn texel(&self, x: usize, y: usize) -> [u8; 4] {
        let g = &self.geometry;
        let (tw, th) = (g.tile_width as usize, g.tile_height as usize);
        let tile = g.tile_index((x / tw) as u32, (y / th) as u32);
        let offset = ((y % th) * tw + x % tw) * BYTES_PER_TEXEL;
        let t = &self.tiles[tile][offset..offset + BYTES_PER_TEXEL];
        [t[0], t[1], t[2], t[3]]
    }

    /// Zeroes alpha on the outer edge of the whole grid only; seams between
    /// interior tiles keep their alpha.
    pub fn mask_outer_border(&mut self) {
        let g = self.geometry;
        let (tw, th) = (g.tile_width as usize, g.tile_height as usize);
        let border = TRANSPARENT_BORDER_WIDTH as usize;

        for ty in 0..g.tiles_y {
            let left = g.tile_index(0, ty);
            let right = g.tile_index(g.tiles_x - 1, ty);
            for y in 0..th {
                for x in 0..border {
                    self.clear_alpha(left, x, y);
                    self.clear_alpha(right, tw - 1 - x, y);
                }
            }
        }

        for tx in 0..g.tiles_x {
            let top = g.tile_index(tx, 0);
            let bottom = g.tile_index(tx, g.tiles_y - 1);
            for x in 0..tw {
                for y in 0..border {
                    self.clear_alpha(top, x, y);
                    self.clear_alpha(bottom, x, th - 1 - y);
                }
            }
        }
    }

    fn clear_alpha(&mut self, tile: usize, x: usize, y: usize) {
        let offset = (y * self.geometry.tile_width as usize + x) * BYTES_PER_TEXEL;
        self.tiles[tile][offset + ALPHA] = 0;
    }

    /// Stitches all tiles into one texture-sized image (debug output).
    pub fn compose(&self) -> RgbaImage {
        let g = &self.geometry;
        let (tw, th) = (g.tile_width as usize, g.tile_height as usize);
        let width = g.texture_width();
        let mut out = vec![0u8; width * g.texture_height() * BYTES_PER_TEXEL];
        for ty in 0..g.tiles_y as usize {
            for tx in 0..g.tiles_x as usize {
                let tile = &self.tiles[g.tile_index(tx as u32, ty as u32)];
                for y in 0..th {
                    let src = &tile[y * tw * BYTES_PER_TEXEL..(y + 1) * tw * BYTES_PER_TEXEL];
                    let dst_start = ((ty * th + y) * width + tx * tw) * BYTES_PER_TEXEL;
                    out[dst_start..dst_start + src.len()].copy_from_slice(src);
                }
            }
        }
        RgbaImage::from_raw(width as u32, g.texture_height() as u32, out)
            .expect("composed buffer matches texture dimensions")
    }
}
