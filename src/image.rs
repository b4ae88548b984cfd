use crate::error::{IcnsError, Result};

/// A decoded pixel grid, as exchanged with the PNG and JPEG 2000 codecs.
#[derive(Clone)]
pub struct Image {
    pub(crate) format: PixelFormat,
    width: u32,
    height: u32,
    pub(crate) data: Box<[u8]>,
}

impl Image {
    /// Creates a new image with all pixel data set to zero.
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Image {
        let data_bytes = format.bytes_per_pixel() * width * height;
        Image {
            format,
            width,
            height,
            data: vec![0u8; data_bytes as usize].into_boxed_slice(),
        }
    }

    /// Creates an image from existing pixel data, which must have exactly
    /// the length implied by the format and dimensions.
    pub fn from_data(format: PixelFormat,
                     width: u32,
                     height: u32,
                     data: Vec<u8>)
                     -> Result<Image> {
        let expected = (format.bytes_per_pixel() * width * height) as usize;
        if data.len() != expected {
            return Err(IcnsError::InvalidArgument(format!(
                "pixel data has {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Image {
            format,
            width,
            height,
            data: data.into_boxed_slice(),
        })
    }

    pub(crate) fn from_parts(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Image {
        Image {
            format,
            width,
            height,
            data: data.into_boxed_slice(),
        }
    }

    /// Returns a copy of this image in the given pixel format.  Color is
    /// reduced to gray by averaging; a missing alpha channel becomes fully
    /// opaque; an alpha-only image is treated as black with that alpha.
    pub fn convert_to(&self, format: PixelFormat) -> Image {
        if format == self.format {
            return self.clone();
        }
        let source = self.format.bytes_per_pixel() as usize;
        let target = format.bytes_per_pixel() as usize;
        let num_pixels = self.data.len() / source;
        let mut data = Vec::with_capacity(num_pixels * target);
        for pixel in self.data.chunks(source) {
            let [r, g, b, a] = self.format.to_rgba(pixel);
            format.push_from_rgba(&mut data, [r, g, b, a]);
        }
        Image {
            format,
            width: self.width,
            height: self.height,
            data: data.into_boxed_slice(),
        }
    }

    /// Returns the format in which this image's pixel data is stored.
    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the width of the image, in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the image, in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns a reference to the image's pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a mutable reference to the image's pixel data.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A format for storing pixel data in an image.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PixelFormat {
    /// 32-bit color with alpha channel.
    RGBA,
    /// 24-bit color with no alpha.
    RGB,
    /// 16-bit grayscale with alpha channel.
    GrayAlpha,
    /// 8-bit grayscale with no alpha.
    Gray,
    /// 8-bit alpha mask with no color.
    Alpha,
}

impl PixelFormat {
    /// Returns the number of bytes needed to store a single pixel in this
    /// format.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::RGBA => 4,
            PixelFormat::RGB => 3,
            PixelFormat::GrayAlpha => 2,
            PixelFormat::Gray | PixelFormat::Alpha => 1,
        }
    }

    fn to_rgba(self, pixel: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::RGBA => [pixel[0], pixel[1], pixel[2], pixel[3]],
            PixelFormat::RGB => [pixel[0], pixel[1], pixel[2], u8::MAX],
            PixelFormat::GrayAlpha => [pixel[0], pixel[0], pixel[0], pixel[1]],
            PixelFormat::Gray => [pixel[0], pixel[0], pixel[0], u8::MAX],
            PixelFormat::Alpha => [0, 0, 0, pixel[0]],
        }
    }

    fn push_from_rgba(self, out: &mut Vec<u8>, [r, g, b, a]: [u8; 4]) {
        let gray = ((u32::from(r) + u32::from(g) + u32::from(b)) / 3) as u8;
        match self {
            PixelFormat::RGBA => out.extend_from_slice(&[r, g, b, a]),
            PixelFormat::RGB => out.extend_from_slice(&[r, g, b]),
            PixelFormat::GrayAlpha => out.extend_from_slice(&[gray, a]),
            PixelFormat::Gray => out.push(gray),
            PixelFormat::Alpha => out.push(a),
        }
    }
}
