use anyhow::{Context, Result};
use tracing::info;

use super::TileDevice;
use crate::error::Error;

const TILE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Headless wgpu device that owns the tile textures.
pub struct WgpuTileDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

pub struct WgpuTileTexture {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
}

impl WgpuTileDevice {
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("request wgpu adapter")?;
        let info = adapter.get_info();
        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("tile-upload-device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("request wgpu device")?;
        info!(adapter = %info.name, backend = ?info.backend, "graphics device ready");
        Ok(Self { device, queue })
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

impl TileDevice for WgpuTileDevice {
    type Texture = WgpuTileTexture;

    fn create_tile_texture(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
    ) -> Result<WgpuTileTexture, Error> {
        let max = self.max_texture_dimension();
        if width > max || height > max {
            return Err(Error::Device(format!(
                "tile {width}x{height} exceeds device limit {max}"
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TILE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Ok(WgpuTileTexture {
            texture,
            width,
            height,
        })
    }

    fn upload_tile(&mut self, texture: &WgpuTileTexture, pixels: &[u8]) -> Result<(), Error> {
        let expected = texture.width as usize * texture.height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::Device(format!(
                "upload of {} bytes into {}x{} texture",
                pixels.len(),
                texture.width,
                texture.height
            )));
        }
        self.queue.write_texture(
            texture.texture.as_image_copy(),
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * texture.width),
                rows_per_image: Some(texture.height),
            },
            wgpu::Extent3d {
                width: texture.width,
                height: texture.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::empty());
        Ok(())
    }
}
