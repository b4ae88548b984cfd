//! Separable alpha, red, green and blue channels of raw pixel records.
//!
//! ICNS stores small icons as planar channel data rather than interleaved
//! pixels: `ARGB` records hold four RLE-compressed planes, RGB records hold
//! three (with alpha in a separate 8-bit mask element), and the oldest types
//! hold 1-bit icon and mask bitmaps.

use crate::error::{IcnsError, Result};
use crate::guess::classify_encoding;
use crate::icontype::{Encoding, IconType};
use crate::image::{Image, PixelFormat};
use crate::packbits;

/// Magic prefix of ARGB records.
const ARGB_MAGIC: &[u8; 4] = b"ARGB";

/// A raw pixel record split into four equal-length channels.
#[derive(Clone, Debug, PartialEq)]
pub struct ArgbImage {
    width: u32,
    height: u32,
    channels: u32,
    alpha: Vec<u8>,
    red: Vec<u8>,
    green: Vec<u8>,
    blue: Vec<u8>,
}

impl ArgbImage {
    fn from_planes(icon_type: &IconType, channels: u32, planes: [Vec<u8>; 4]) -> ArgbImage {
        let (width, height) = icon_type.size().unwrap_or((0, 0));
        let [alpha, red, green, blue] = planes;
        ArgbImage { width, height, channels, alpha, red, green, blue }
    }

    /// Loads an ARGB or RGB record without knowing its tag.  The record type
    /// is inferred from the magic (`ARGB` or none) and the decompressed
    /// length.  A leading run of four zero bytes is taken to be the `it32`
    /// header and skipped.
    pub fn from_data(data: &[u8]) -> Result<ArgbImage> {
        let is_argb = data.starts_with(ARGB_MAGIC);
        let body = if is_argb || data.starts_with(&[0; 4]) {
            &data[4..]
        } else {
            data
        };
        let uncompressed = packbits::unpack(body)?;
        let encoding = if is_argb { Encoding::Argb } else { Encoding::Rgb };
        let icon_type = IconType::match_by_decompressed_size(uncompressed.len(), encoding)?;
        let channels = if is_argb { 4 } else { 3 };
        let planes = icon_type.split_channels(&uncompressed)?;
        Ok(ArgbImage::from_planes(icon_type, channels, planes))
    }

    /// Loads the payload of an element of the given type: ARGB, RGB (with the
    /// `it32` header stripped) or a 1-bit bitmap.
    pub fn from_element(icon_type: &IconType, data: &[u8]) -> Result<ArgbImage> {
        if icon_type.bits() == Some(1) {
            return ArgbImage::from_mono(data, icon_type);
        }
        let encoding = classify_encoding(data);
        let channels = match encoding {
            Some(Encoding::Argb) if icon_type.accepts(Encoding::Argb) => 4,
            None if icon_type.accepts(Encoding::Rgb) => 3,
            _ => {
                return Err(IcnsError::InvalidArgument(format!(
                    "{} data of {} is not a raw pixel record",
                    encoding.map_or("binary", Encoding::ext),
                    icon_type.ostype()
                )))
            }
        };
        let uncompressed = icon_type.decompress(data, encoding)?;
        let planes = icon_type.split_channels(&uncompressed)?;
        Ok(ArgbImage::from_planes(icon_type, channels, planes))
    }

    /// Loads a 1-bit monochrome record.  Every byte expands, most significant
    /// bit first, into eight samples of 0 or 255.  Two-channel types carry
    /// the mask in the second half.
    pub fn from_mono(data: &[u8], icon_type: &IconType) -> Result<ArgbImage> {
        let channels = match (icon_type.bits(), icon_type.channels()) {
            (Some(1), Some(channels @ 1)) | (Some(1), Some(channels @ 2)) => channels,
            _ => {
                return Err(IcnsError::InvalidArgument(format!(
                    "{} is not a 1-bit icon type",
                    icon_type.ostype()
                )))
            }
        };
        let expected = icon_type.max_size().unwrap_or(0);
        if data.len() != expected {
            return Err(IcnsError::SizeMismatch {
                ostype: icon_type.ostype(),
                expected,
                actual: data.len(),
            });
        }
        let mut samples = Vec::with_capacity(data.len() * 8);
        for &byte in data {
            for bit in (0..8).rev() {
                samples.push(if byte & (1 << bit) != 0 { u8::MAX } else { 0 });
            }
        }
        let alpha = if channels == 2 {
            samples.split_off(samples.len() / 2)
        } else {
            vec![u8::MAX; samples.len()]
        };
        let planes = [alpha, samples.clone(), samples.clone(), samples];
        Ok(ArgbImage::from_planes(icon_type, channels, planes))
    }

    /// Splits an image into channels.
    pub fn from_image(image: &Image) -> ArgbImage {
        let rgba = image.convert_to(PixelFormat::RGBA);
        let num_pixels = rgba.data().len() / 4;
        let mut argb = ArgbImage {
            width: image.width(),
            height: image.height(),
            channels: 4,
            alpha: Vec::with_capacity(num_pixels),
            red: Vec::with_capacity(num_pixels),
            green: Vec::with_capacity(num_pixels),
            blue: Vec::with_capacity(num_pixels),
        };
        for pixel in rgba.data().chunks(4) {
            argb.red.push(pixel[0]);
            argb.green.push(pixel[1]);
            argb.blue.push(pixel[2]);
            argb.alpha.push(pixel[3]);
        }
        argb
    }

    /// Replaces the alpha channel with an uncompressed 8-bit mask, which
    /// must have exactly one sample per pixel.
    pub fn load_mask(&mut self, mask: &[u8]) -> Result<()> {
        if mask.len() != self.red.len() {
            return Err(IcnsError::InvalidArgument(format!(
                "mask has {} samples, image has {}",
                mask.len(),
                self.red.len()
            )));
        }
        self.alpha = mask.to_vec();
        Ok(())
    }

    /// Returns the image width, in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the image height, in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of channels in the source record (1 or 2 for bitmaps, 3 for
    /// RGB, 4 for ARGB and converted images).
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// The alpha channel.
    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// The red channel.
    pub fn red(&self) -> &[u8] {
        &self.red
    }

    /// The green channel.
    pub fn green(&self) -> &[u8] {
        &self.green
    }

    /// The blue channel.
    pub fn blue(&self) -> &[u8] {
        &self.blue
    }

    /// Returns the alpha channel as an 8-bit mask (optionally compressed),
    /// or packed to 1, 2 or 4 bits per sample.
    pub fn mask_data(&self, bits: u32, compress: bool) -> Result<Vec<u8>> {
        if bits == 8 {
            Ok(if compress {
                packbits::pack(&self.alpha)
            } else {
                self.alpha.clone()
            })
        } else {
            packbits::msb_stream(&self.alpha, bits)
        }
    }

    /// Returns the red, green and blue channels back to back, each one
    /// compressed separately if requested.
    pub fn rgb_data(&self, compress: bool) -> Vec<u8> {
        let mut output = Vec::new();
        for channel in [&self.red, &self.green, &self.blue] {
            if compress {
                output.extend_from_slice(&packbits::pack(channel));
            } else {
                output.extend_from_slice(channel);
            }
        }
        output
    }

    /// Returns an ARGB record: the magic followed by the alpha, red, green
    /// and blue channels.
    pub fn argb_data(&self, compress: bool) -> Vec<u8> {
        let mut output = ARGB_MAGIC.to_vec();
        if compress {
            output.extend_from_slice(&packbits::pack(&self.alpha));
        } else {
            output.extend_from_slice(&self.alpha);
        }
        output.extend_from_slice(&self.rgb_data(compress));
        output
    }

    /// Serializes the channels as the payload of an element of the given
    /// type: an ARGB record for ARGB types, RGB channels for RGB types (with
    /// the four zero bytes `it32` requires).  The alpha channel of an RGB
    /// type belongs in a separate mask element (see
    /// [`mask_data`](#method.mask_data)).
    pub fn encode_for(&self, icon_type: &IconType, compress: bool) -> Result<Vec<u8>> {
        if icon_type.size() != Some((self.width, self.height)) {
            return Err(IcnsError::InvalidArgument(format!(
                "{}x{} image does not fit {}",
                self.width,
                self.height,
                icon_type.ostype()
            )));
        }
        if icon_type.accepts(Encoding::Argb) {
            Ok(self.argb_data(compress))
        } else if icon_type.accepts(Encoding::Rgb) {
            let mut output = Vec::new();
            if icon_type.has_legacy_header() {
                output.extend_from_slice(&[0; 4]);
            }
            output.extend_from_slice(&self.rgb_data(compress));
            Ok(output)
        } else {
            Err(IcnsError::InvalidArgument(format!(
                "{} does not store raw pixel data",
                icon_type.ostype()
            )))
        }
    }

    /// Interleaves the channels into an RGBA image.
    pub fn to_image(&self) -> Image {
        let mut data = Vec::with_capacity(self.red.len() * 4);
        for i in 0..self.red.len() {
            data.extend_from_slice(&[self.red[i], self.green[i], self.blue[i], self.alpha[i]]);
        }
        Image::from_parts(PixelFormat::RGBA, self.width, self.height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icontype::OSType;

    const CH_255: [u8; 4] = [0xFF, 0xFF, 0xFB, 0xFF];
    const CH_128: [u8; 4] = [0xFF, 0x80, 0xFB, 0x80];
    const CH_000: [u8; 4] = [0xFF, 0x00, 0xFB, 0x00];

    fn get(raw: &[u8; 4]) -> &'static IconType {
        IconType::lookup(OSType(*raw)).unwrap()
    }

    fn assert_equal_lengths(image: &ArgbImage) {
        assert_eq!(image.alpha().len(), image.red().len());
        assert_eq!(image.red().len(), image.green().len());
        assert_eq!(image.green().len(), image.blue().len());
    }

    #[test]
    fn load_argb_data() {
        let data = [&b"ARGB"[..], &CH_000, &CH_128, &CH_000, &CH_255].concat();
        let image = ArgbImage::from_data(&data).unwrap();
        assert_eq!((image.width(), image.height()), (16, 16));
        assert_eq!(image.channels(), 4);
        assert_eq!(image.alpha(), &[0; 256][..]);
        assert_eq!(image.red(), &[128; 256][..]);
        assert_eq!(image.green(), &[0; 256][..]);
        assert_eq!(image.blue(), &[255; 256][..]);
    }

    #[test]
    fn load_rgb_data_and_mask() {
        let data = [&CH_128[..], &CH_000, &CH_255].concat();
        let mut image = ArgbImage::from_data(&data).unwrap();
        assert_eq!((image.width(), image.height()), (16, 16));
        assert_eq!(image.alpha(), &[255; 256][..]);
        assert_eq!(image.red(), &[128; 256][..]);
        image.load_mask(&[0x75; 256]).unwrap();
        assert_eq!(image.alpha(), &[117; 256][..]);
        assert_eq!(image.blue(), &[255; 256][..]);
        assert!(matches!(image.load_mask(&[117; 42]), Err(IcnsError::InvalidArgument(_))));
        assert_equal_lengths(&image);
    }

    #[test]
    fn load_it32_element() {
        let mut data = vec![0, 0, 0, 0];
        for _ in 0..3 {
            data.extend_from_slice(&packbits::pack(&[9u8; 128 * 128]));
        }
        let image = ArgbImage::from_element(get(b"it32"), &data).unwrap();
        assert_eq!((image.width(), image.height()), (128, 128));
        assert_eq!(image.red()[0], 9);
        assert_equal_lengths(&image);
        assert_eq!(image.encode_for(get(b"it32"), true).unwrap(), data);
    }

    #[test]
    fn load_element_with_wrong_size() {
        let data = packbits::pack(&[1u8; 700]);
        assert!(matches!(
            ArgbImage::from_element(get(b"is32"), &data),
            Err(IcnsError::SizeMismatch { expected: 768, actual: 700, .. })
        ));
    }

    #[test]
    fn load_element_rejects_png() {
        assert!(matches!(
            ArgbImage::from_element(get(b"icp4"), b"\x89PNG\x0d\x0a\x1a\x0a"),
            Err(IcnsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn load_mono_with_mask() {
        let mut data = vec![0xF0u8; 128];
        data.extend_from_slice(&[0x0F; 128]);
        let image = ArgbImage::from_element(get(b"ICN#"), &data).unwrap();
        assert_eq!((image.width(), image.height()), (32, 32));
        assert_eq!(image.channels(), 2);
        assert_eq!(&image.red()[..8], &[255, 255, 255, 255, 0, 0, 0, 0]);
        assert_eq!(&image.alpha()[..8], &[0, 0, 0, 0, 255, 255, 255, 255]);
        assert_eq!(image.red(), image.blue());
        assert_equal_lengths(&image);
        assert_eq!(image.mask_data(1, false).unwrap(), vec![0x0F; 128]);
    }

    #[test]
    fn load_mono_without_mask() {
        let image = ArgbImage::from_mono(&[0x80; 128], get(b"ICON")).unwrap();
        assert_eq!(image.alpha(), &[255; 1024][..]);
        assert_eq!(image.green()[0], 255);
        assert_eq!(image.green()[1], 0);
        assert!(ArgbImage::from_mono(&[0x80; 127], get(b"ICON")).is_err());
        assert!(ArgbImage::from_mono(&[0x80; 256], get(b"s8mk")).is_err());
    }

    #[test]
    fn data_getters() {
        let data = [&b"ARGB"[..], &CH_255, &CH_000, &CH_000, &CH_000].concat();
        let image = ArgbImage::from_data(&data).unwrap();
        let argb = image.argb_data(true);
        assert_eq!(argb, data);
        assert_eq!(image.argb_data(false).len(), 4 + 16 * 16 * 4);
        assert_eq!(image.rgb_data(true).len(), 12);
        assert_eq!(image.rgb_data(false), vec![0; 16 * 16 * 3]);
        assert_eq!(image.mask_data(8, true).unwrap(), CH_255.to_vec());
        assert_eq!(image.mask_data(8, false).unwrap(), vec![0xFF; 256]);
        assert_eq!(image.mask_data(4, false).unwrap(), vec![0xFF; 128]);
        assert_eq!(image.encode_for(get(b"ic04"), true).unwrap(), data);
        assert!(image.encode_for(get(b"ic05"), true).is_err());
        assert!(image.encode_for(get(b"s8mk"), true).is_err());
    }

    #[test]
    fn image_round_trip() {
        let mut source = Image::new(PixelFormat::RGBA, 2, 2);
        source.data_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        let argb = ArgbImage::from_image(&source);
        assert_eq!(argb.alpha(), &[4, 8, 12, 16]);
        assert_eq!(argb.red(), &[1, 5, 9, 13]);
        let image = argb.to_image();
        assert_eq!(image.pixel_format(), PixelFormat::RGBA);
        assert_eq!(image.data(), source.data());
    }
}
