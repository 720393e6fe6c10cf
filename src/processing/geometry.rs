use anyhow::{Result, ensure};

/// Inset, in texels, subtracted from each edge of a tile's usable region so
/// bilinear taps near a tile edge never read outside the tile's texture.
/// Must be a multiple of 0.5.
pub const EDGE_SHRINK: f64 = 0.5;

/// Width of the transparent strip painted on the outer edge of the tile grid.
pub const TRANSPARENT_BORDER_WIDTH: u32 = 1;

/// Source image pixel: RGB.
pub const BYTES_PER_PIXEL: usize = 3;
/// Destination texel: RGBA, alpha used for border masking only.
pub const BYTES_PER_TEXEL: usize = 4;

/// Fixed destination tile grid. Immutable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGeometry {
    /// Derives the grid from a tile size and the total texture size.
    pub fn new(tile_size: [u32; 2], texture_size: [u32; 2]) -> Result<Self> {
        let [tile_width, tile_height] = tile_size;
        let [texture_width, texture_height] = texture_size;
        let min_tile = 2 * TRANSPARENT_BORDER_WIDTH;
        ensure!(
            tile_width > min_tile && tile_height > min_tile,
            "tile-size must exceed {min_tile} texels on each axis"
        );
        ensure!(
            texture_width >= tile_width && texture_width % tile_width == 0,
            "texture width {texture_width} must be a multiple of tile width {tile_width}"
        );
        ensure!(
            texture_height >= tile_height && texture_height % tile_height == 0,
            "texture height {texture_height} must be a multiple of tile height {tile_height}"
        );
        Ok(Self {
            tile_width,
            tile_height,
            tiles_x: texture_width / tile_width,
            tiles_y: texture_height / tile_height,
        })
    }

    pub fn texture_width(&self) -> usize {
        (self.tile_width * self.tiles_x) as usize
    }

    pub fn texture_height(&self) -> usize {
        (self.tile_height * self.tiles_y) as usize
    }

    pub fn tile_count(&self) -> usize {
        (self.tiles_x * self.tiles_y) as usize
    }

    /// Bytes of one RGBA tile buffer.
    pub fn tile_bytes(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize * BYTES_PER_TEXEL
    }

    /// Row-major tile index for tile column `tx`, tile row `ty`.
    pub fn tile_index(&self, tx: u32, ty: u32) -> usize {
        (ty * self.tiles_x + tx) as usize
    }
}

/// Splits a flat destination index along one axis into `(tile, offset)`.
#[inline]
pub fn locate(index: usize, tile_len: usize) -> (usize, usize) {
    (index / tile_len, index % tile_len)
}

/// Number of texels along one axis that actually carry image content once
/// every tile gives up `EDGE_SHRINK` on both edges.
pub fn effective_length(destination_len: usize, tile_len: usize) -> usize {
    let tiles = destination_len / tile_len;
    let effective_tile = (tile_len as f64 - EDGE_SHRINK * 2.0) as usize;
    tiles * effective_tile
}

/// Continuous position in the effective (shrink-adjusted) destination space
/// of destination texel `index`. Adjacent tiles share their seam texel.
pub fn effective_position(index: usize, tile_len: usize) -> f64 {
    let (tile, offset) = locate(index, tile_len);
    let effective_tile = (tile_len as f64 - EDGE_SHRINK * 2.0) as usize;
    (tile * effective_tile) as f64 + (offset as f64 - EDGE_SHRINK)
}
