use crate::image::{Image, PixelFormat};
use std::io::{self, BufRead, Cursor, Seek, Write};

impl Image {
    /// Reads an image from a PNG file.
    pub fn read_png<R: BufRead + Seek>(input: R) -> io::Result<Image> {
        let mut decoder = png::Decoder::new(input);
        decoder.set_transformations(
            png::Transformations::STRIP_16 | png::Transformations::EXPAND,
        );
        let info = decoder.read_header_info()?;
        let (width, height) = (info.width, info.height);
        let mut reader = decoder.read_info()?;

        let (color_type, bit_depth) = reader.output_color_type();
        if bit_depth != png::BitDepth::Eight {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected PNG output bit depth {:?}", bit_depth),
            ));
        }
        let pixel_format = match color_type {
            png::ColorType::Rgba => PixelFormat::RGBA,
            png::ColorType::Rgb => PixelFormat::RGB,
            png::ColorType::GrayscaleAlpha => PixelFormat::GrayAlpha,
            png::ColorType::Grayscale => PixelFormat::Gray,
            png::ColorType::Indexed => {
                // EXPAND prevents paletted output
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "paletted PNG output",
                ));
            }
        };

        let mut image = Image::new(pixel_format, width, height);
        if reader.output_buffer_size() != Some(image.data().len()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "PNG frame size does not match its header",
            ));
        }
        reader.next_frame(image.data_mut())?;
        reader.finish()?;
        Ok(image)
    }

    /// Reads only the width and height from the header of PNG data.
    pub fn png_dimensions(data: &[u8]) -> io::Result<(u32, u32)> {
        let mut decoder = png::Decoder::new(Cursor::new(data));
        let info = decoder.read_header_info()?;
        Ok((info.width, info.height))
    }

    /// Writes the image to a PNG file.
    pub fn write_png<W: Write>(&self, output: W) -> io::Result<()> {
        let color_type = match self.format {
            PixelFormat::RGBA => png::ColorType::Rgba,
            PixelFormat::RGB => png::ColorType::Rgb,
            PixelFormat::GrayAlpha => png::ColorType::GrayscaleAlpha,
            PixelFormat::Gray => png::ColorType::Grayscale,
            PixelFormat::Alpha => {
                return self
                    .convert_to(PixelFormat::GrayAlpha)
                    .write_png(output);
            }
        };
        let mut encoder = png::Encoder::new(output, self.width(), self.height());
        encoder.set_color(color_type);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.data)?;
        writer.finish()?;
        Ok(())
    }
}
