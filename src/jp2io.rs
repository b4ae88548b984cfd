use crate::image::{Image, PixelFormat};
use hayro_jpeg2000::ColorSpace;
use std::io;

fn invalid<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

impl Image {
    /// Reads an image from a JPEG 2000 file or codestream.  Only gray and
    /// RGB color spaces (with or without alpha) are supported.
    pub fn read_jp2(input: &[u8]) -> io::Result<Image> {
        let settings = hayro_jpeg2000::DecodeSettings {
            resolve_palette_indices: true,
            strict: false,
            target_resolution: None,
        };
        let image = hayro_jpeg2000::Image::new(input, &settings).map_err(invalid)?;
        let pixel_format = match (image.color_space(), image.has_alpha()) {
            (ColorSpace::Gray, true) => PixelFormat::GrayAlpha,
            (ColorSpace::Gray, false) => PixelFormat::Gray,
            (ColorSpace::RGB, true) => PixelFormat::RGBA,
            (ColorSpace::RGB, false) => PixelFormat::RGB,
            (ColorSpace::CMYK, _) => {
                return Err(invalid("jpeg2000 images with CMYK color space not supported"));
            }
            (ColorSpace::Unknown { num_channels }, _) => {
                return Err(invalid(format!(
                    "jpeg2000 images with Unknown ({num_channels}\
                    -channel) color space not supported"
                )));
            }
            (ColorSpace::Icc { .. }, _) => {
                return Err(invalid("jpeg2000 images with ICC profile not supported"));
            }
        };
        let (width, height) = (image.width(), image.height());
        let pixels = image.decode().map_err(invalid)?;
        let mut out = Image::new(pixel_format, width, height);
        if pixels.len() != out.data.len() {
            return Err(invalid(format!(
                "decoded {} bytes of pixel data, expected {}",
                pixels.len(),
                out.data.len()
            )));
        }
        out.data_mut().copy_from_slice(&pixels);
        Ok(out)
    }
}
