//! Graphics device seam: fixed-size RGBA tile textures and per-tile uploads.

pub mod wgpu_device;

use std::collections::HashMap;

use crate::error::Error;

pub trait TileDevice {
    type Texture;

    /// Creates one tile texture (RGBA8, `width` x `height`).
    fn create_tile_texture(&mut self, label: &str, width: u32, height: u32)
    -> Result<Self::Texture, Error>;

    /// Replaces the full contents of `texture` with `pixels`.
    fn upload_tile(&mut self, texture: &Self::Texture, pixels: &[u8]) -> Result<(), Error>;
}

/// Handle into a [`MemoryDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryTexture(pub usize);

/// Device that keeps textures in host memory. Used with `--no-gpu` and in
/// tests; uploads can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    textures: Vec<MemoryTextureData>,
    failures: HashMap<usize, u32>,
    uploads: usize,
}

#[derive(Debug)]
struct MemoryTextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` uploads to `texture` fail.
    pub fn fail_uploads(&mut self, texture: MemoryTexture, count: u32) {
        self.failures.insert(texture.0, count);
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Successful uploads so far.
    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    pub fn pixels(&self, texture: MemoryTexture) -> &[u8] {
        &self.textures[texture.0].pixels
    }
}

impl TileDevice for MemoryDevice {
    type Texture = MemoryTexture;

    fn create_tile_texture(
        &mut self,
        _label: &str,
        width: u32,
        height: u32,
    ) -> Result<MemoryTexture, Error> {
        self.textures.push(MemoryTextureData {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        });
        Ok(MemoryTexture(self.textures.len() - 1))
    }

    fn upload_tile(&mut self, texture: &MemoryTexture, pixels: &[u8]) -> Result<(), Error> {
        if let Some(remaining) = self.failures.get_mut(&texture.0) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Device(format!(
                    "injected upload failure for texture {}",
                    texture.0
                )));
            }
        }
        let data = self
            .textures
            .get_mut(texture.0)
            .ok_or_else(|| Error::Device(format!("unknown texture {}", texture.0)))?;
        let expected = data.width as usize * data.height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::Device(format!(
                "upload of {} bytes into {}x{} texture",
                pixels.len(),
                data.width,
                data.height
            )));
        }
        data.pixels.copy_from_slice(pixels);
        self.uploads += 1;
        Ok(())
    }
}
