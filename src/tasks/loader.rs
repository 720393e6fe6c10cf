//! Image decoding for the producer: turns a catalog path into RGB rows.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{ImageFormat, RgbImage, imageops};
use jpeg_decoder::{Decoder as JpegDecoder, PixelFormat};
use tracing::debug;

use crate::error::Error;
use crate::processing::geometry::BYTES_PER_PIXEL;

/// Supplies a decoded image one RGB row at a time, top to bottom.
pub trait RowSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Copies row `y` (`width * 3` bytes) into `dst`.
    fn read_row(&mut self, y: u32, dst: &mut [u8]) -> Result<(), Error>;
}

pub trait ImageLoader: Send {
    type Source: RowSource;

    fn open(&self, path: &Path) -> Result<Self::Source, Error>;
}

/// Fully decoded RGB image served row by row.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: RgbImage,
}

impl DecodedImage {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }
}

impl RowSource for DecodedImage {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn read_row(&mut self, y: u32, dst: &mut [u8]) -> Result<(), Error> {
        let stride = self.image.width() as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        let row = self.image.as_raw().get(start..start + stride).ok_or_else(|| {
            Error::Decode {
                path: Default::default(),
                message: format!("row {y} out of range"),
            }
        })?;
        dst[..stride].copy_from_slice(row);
        Ok(())
    }
}

/// Decodes JPEG/PNG/WebP/GIF files from disk and applies EXIF orientation.
///
/// JPEGs are decoded with DCT scaling at the smallest size that still covers
/// the texture, which keeps decode memory well below full resolution.
#[derive(Debug, Clone, Copy)]
pub struct FileLoader {
    target_width: u32,
    target_height: u32,
}

impl FileLoader {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    fn decode(&self, path: &Path) -> Result<RgbImage, Error> {
        let orientation = read_orientation(path).unwrap_or(1);
        let (target_w, target_h) = if orientation >= 5 {
            (self.target_height, self.target_width)
        } else {
            (self.target_width, self.target_height)
        };

        let is_jpeg = matches!(ImageFormat::from_path(path), Ok(ImageFormat::Jpeg));
        let img = if is_jpeg {
            match decode_jpeg_scaled(path, target_w, target_h) {
                Ok(img) => img,
                Err(message) => {
                    debug!(
                        path = %path.display(),
                        "scaled JPEG decode failed: {message}; falling back"
                    );
                    decode_any(path)?
                }
            }
        } else {
            decode_any(path)?
        };
        Ok(apply_orientation(img, orientation))
    }
}

impl ImageLoader for FileLoader {
    type Source = DecodedImage;

    fn open(&self, path: &Path) -> Result<DecodedImage, Error> {
        let img = self.decode(path)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(Error::Decode {
                path: path.to_path_buf(),
                message: "image has no pixels".into(),
            });
        }
        debug!(
            path = %path.display(),
            width = img.width(),
            height = img.height(),
            "decoded"
        );
        Ok(DecodedImage::new(img))
    }
}

fn decode_any(path: &Path) -> Result<RgbImage, Error> {
    let decode_err = |message: String| Error::Decode {
        path: path.to_path_buf(),
        message,
    };
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|err| decode_err(err.to_string()))?;
    Ok(img.to_rgb8())
}

fn decode_jpeg_scaled(path: &Path, target_w: u32, target_h: u32) -> Result<RgbImage, String> {
    let file = File::open(path).map_err(|err| err.to_string())?;
    let mut decoder = JpegDecoder::new(BufReader::new(file));
    let request_w = target_w.clamp(1, u16::MAX as u32) as u16;
    let request_h = target_h.clamp(1, u16::MAX as u32) as u16;
    decoder
        .scale(request_w, request_h)
        .map_err(|err| err.to_string())?;
    let pixels = decoder.decode().map_err(|err| err.to_string())?;
    let info = decoder
        .info()
        .ok_or_else(|| "missing image info".to_string())?;

    let rgb = match info.pixel_format {
        PixelFormat::RGB24 => pixels,
        PixelFormat::L8 => pixels.iter().flat_map(|&v| [v, v, v]).collect(),
        PixelFormat::CMYK32 => pixels
            .chunks_exact(4)
            .flat_map(|chunk| {
                let k = chunk[3] as f32 / 255.0;
                let channel = |v: u8| {
                    let c = v as f32 / 255.0 * (1.0 - k) + k;
                    ((1.0 - c) * 255.0).round().clamp(0.0, 255.0) as u8
                };
                [channel(chunk[0]), channel(chunk[1]), channel(chunk[2])]
            })
            .collect(),
        PixelFormat::L16 => return Err("16-bit grayscale JPEGs are not supported".into()),
    };

    RgbImage::from_raw(info.width as u32, info.height as u32, rgb)
        .ok_or_else(|| "decoded buffer does not match image size".to_string())
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!(orientation = o, path = %path.display(), "exif orientation");
    Some(o)
}

fn apply_orientation(img: RgbImage, orientation: u16) -> RgbImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}
