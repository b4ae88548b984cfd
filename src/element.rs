use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use crate::argb::ArgbImage;
use crate::error::{IcnsError, Result};
use crate::guess::classify_encoding;
use crate::icontype::{Encoding, IconType, OSType};
use crate::image::{Image, PixelFormat};

/// The first four bytes of an ICNS file:
pub const ICNS_MAGIC_LITERAL: &[u8; 4] = b"icns";

/// The length of an icon element header, in bytes:
pub const ICON_ELEMENT_HEADER_LENGTH: u32 = 8;

/// One entry in an ICNS file.  Depending on the resource type, this may
/// represent an icon, or part of an icon (such as an alpha mask, or color
/// data without the mask), a nested container, or metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct IconElement {
    /// The OSType for this element (e.g. `it32` or `t8mk`).
    pub ostype: OSType,
    /// The raw data payload.
    pub data: Vec<u8>,
}

impl IconElement {
    /// Creates an icon element with the given OSType and data payload.
    pub fn new(ostype: OSType, data: Vec<u8>) -> IconElement {
        IconElement { ostype, data }
    }

    /// Returns the OSType for this element.
    pub fn ostype(&self) -> OSType {
        self.ostype
    }

    /// Returns the catalog entry for this element's OSType, if known.
    pub fn icon_type(&self) -> Option<&'static IconType> {
        IconType::from_ostype(self.ostype)
    }

    /// Returns the encoded data for this element.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Sniffs the encoding of the payload (see
    /// [`classify_encoding`](../fn.classify_encoding.html)).
    pub fn encoding(&self) -> Option<Encoding> {
        classify_encoding(&self.data)
    }

    /// Returns the encoded length of the element, in bytes, including the
    /// length of the header.
    pub fn total_length(&self) -> u32 {
        ICON_ELEMENT_HEADER_LENGTH + (self.data.len() as u32)
    }

    /// Reads an icon element from within an ICNS file.  Returns `Ok(None)`
    /// if the input ends before a complete header.  A payload cut short by
    /// the end of input is returned as-is.
    pub fn read<R: Read>(mut reader: R) -> Result<Option<IconElement>> {
        let mut header = [0u8; ICON_ELEMENT_HEADER_LENGTH as usize];
        if read_up_to(&mut reader, &mut header)? < header.len() {
            return Ok(None);
        }
        let ostype = OSType([header[0], header[1], header[2], header[3]]);
        let element_length = BigEndian::read_u32(&header[4..]);
        if element_length < ICON_ELEMENT_HEADER_LENGTH {
            return Err(IcnsError::Corrupt(format!(
                "invalid element length for {}: {}",
                ostype, element_length
            )));
        }
        let data_length = u64::from(element_length - ICON_ELEMENT_HEADER_LENGTH);
        let mut data = Vec::new();
        reader.take(data_length).read_to_end(&mut data)?;
        if (data.len() as u64) < data_length {
            log::debug!(
                "element {} truncated: {} of {} bytes",
                ostype,
                data.len(),
                data_length
            );
        }
        Ok(Some(IconElement::new(ostype, data)))
    }

    /// Writes the icon element to within an ICNS file.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.ostype.bytes())?;
        writer.write_u32::<BigEndian>(self.total_length())?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Decodes the element into an RGBA image (or an alpha image, for 8-bit
    /// masks).  PNG and JPEG 2000 payloads go through the image codecs;
    /// ARGB, RGB and 1-bit payloads through the channel model.
    pub fn decode_image(&self) -> Result<Image> {
        let icon_type = IconType::lookup(self.ostype)?;
        match self.encoding() {
            Some(Encoding::Png) => decode_png(&self.data),
            Some(Encoding::Jp2) => decode_jp2(&self.data),
            None if icon_type.desc() == "mask" && icon_type.bits() == Some(8) => {
                let expected = icon_type.max_size().unwrap_or(0);
                if self.data.len() != expected {
                    return Err(IcnsError::SizeMismatch {
                        ostype: self.ostype,
                        expected,
                        actual: self.data.len(),
                    });
                }
                let (width, height) = icon_type.size().unwrap_or((0, 0));
                Image::from_data(PixelFormat::Alpha, width, height, self.data.clone())
            }
            _ => Ok(ArgbImage::from_element(icon_type, &self.data)?.to_image()),
        }
    }

    /// Decodes this element together with a separate 8-bit mask element
    /// into a single RGBA image.  Payloads that carry their own alpha
    /// (PNG, JPEG 2000) ignore the mask.
    pub fn decode_image_with_mask(&self, mask: &IconElement) -> Result<Image> {
        match self.encoding() {
            Some(Encoding::Png) | Some(Encoding::Jp2) => self.decode_image(),
            _ => {
                let icon_type = IconType::lookup(self.ostype)?;
                let mut argb = ArgbImage::from_element(icon_type, &self.data)?;
                argb.load_mask(&mask.data)?;
                Ok(argb.to_image())
            }
        }
    }
}

#[cfg(feature = "pngio")]
fn decode_png(data: &[u8]) -> Result<Image> {
    Ok(Image::read_png(io::Cursor::new(data))?.convert_to(PixelFormat::RGBA))
}

#[cfg(not(feature = "pngio"))]
fn decode_png(_data: &[u8]) -> Result<Image> {
    Err(IcnsError::InvalidArgument(
        "PNG decoding requires the `pngio` feature".to_string(),
    ))
}

#[cfg(feature = "jp2io")]
fn decode_jp2(data: &[u8]) -> Result<Image> {
    Ok(Image::read_jp2(data)?.convert_to(PixelFormat::RGBA))
}

#[cfg(not(feature = "jp2io"))]
fn decode_jp2(_data: &[u8]) -> Result<Image> {
    Err(IcnsError::InvalidArgument(
        "JPEG 2000 decoding requires the `jp2io` feature".to_string(),
    ))
}

/// Fills `buf` as far as the input allows and returns the number of bytes
/// read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Single-pass iterator over the elements of one ICNS source, in on-disk
/// order.  The top-level header is validated on construction; iteration
/// ends cleanly at the end of input and stops after the first error.
pub struct ElementReader<R> {
    reader: R,
    declared_length: u32,
    finished: bool,
}

impl ElementReader<BufReader<File>> {
    /// Opens the ICNS file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ElementReader<BufReader<File>>> {
        ElementReader::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> ElementReader<R> {
    /// Validates the ICNS header of `reader`.  Fails with a parse error if
    /// the magic literal is missing.
    pub fn new(mut reader: R) -> Result<ElementReader<R>> {
        let mut header = [0u8; 8];
        let filled = read_up_to(&mut reader, &mut header)?;
        if filled < header.len() || &header[..4] != ICNS_MAGIC_LITERAL {
            return Err(IcnsError::Parse(
                "missing \"icns\" header (wrong magic literal)".to_string(),
            ));
        }
        Ok(ElementReader {
            reader,
            declared_length: BigEndian::read_u32(&header[4..]),
            finished: false,
        })
    }

    /// Returns the total file length recorded in the header.  It is not
    /// used to bound iteration.
    pub fn declared_length(&self) -> u32 {
        self.declared_length
    }
}

impl<R: Read> Iterator for ElementReader<R> {
    type Item = Result<IconElement>;

    fn next(&mut self) -> Option<Result<IconElement>> {
        if self.finished {
            return None;
        }
        match IconElement::read(self.reader.by_ref()) {
            Ok(Some(element)) => {
                log::trace!("read element {} ({} bytes)", element.ostype, element.data.len());
                Some(Ok(element))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Returns true if `data` looks like the body of an ICNS container whose
/// 8-byte top-level header was stripped: the first two element headers must
/// name catalog types and stay within the buffer.
pub fn is_headerless_container(data: &[u8]) -> bool {
    let mut offset = 0usize;
    for _ in 0..2 {
        let length = match read_length_at(data, offset) {
            Some(length) => length as usize,
            None => return false,
        };
        let ostype = OSType([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]);
        if IconType::from_ostype(ostype).is_none() {
            return false;
        }
        if length < ICON_ELEMENT_HEADER_LENGTH as usize {
            return false;
        }
        offset += length;
        if offset > data.len() {
            return false;
        }
        if offset == data.len() {
            return true;
        }
    }
    true
}

/// Reads the big-endian u32 that follows a 4-byte tag at `offset`.
pub(crate) fn read_length_at(data: &[u8], offset: usize) -> Option<u32> {
    let mut bytes = data.get(offset + 4..offset + 8)?;
    bytes.read_u32::<BigEndian>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_element() {
        let input: &[u8] = b"quux\0\0\0\x0efoobar";
        let element = IconElement::read(input).unwrap().unwrap();
        assert_eq!(element.ostype, OSType(*b"quux"));
        assert_eq!(element.data, b"foobar".to_vec());
        assert_eq!(element.total_length(), 14);
    }

    #[test]
    fn read_element_at_end_of_input() {
        let input: &[u8] = b"quu";
        assert!(IconElement::read(input).unwrap().is_none());
    }

    #[test]
    fn read_element_with_bad_length() {
        let input: &[u8] = b"quux\0\0\0\x04";
        assert!(matches!(IconElement::read(input), Err(IcnsError::Corrupt(_))));
    }

    #[test]
    fn write_element() {
        let element = IconElement::new(OSType(*b"baz!"), b"#".to_vec());
        let mut output: Vec<u8> = vec![];
        element.write(&mut output).expect("write failed");
        assert_eq!(b"baz!\0\0\0\x09#", &output as &[u8]);
    }

    #[test]
    fn element_reader_yields_in_order() {
        let input: &[u8] = b"icns\0\0\0\x1fquux\0\0\0\x0efoobarbaz!\0\0\0\x09#";
        let reader = ElementReader::new(input).unwrap();
        assert_eq!(reader.declared_length(), 0x1f);
        let elements: Vec<IconElement> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].ostype, OSType(*b"quux"));
        assert_eq!(elements[1].data, b"#".to_vec());
    }

    #[test]
    fn element_reader_rejects_missing_magic() {
        let input: &[u8] = b"ARGB\0\0\0\x08";
        assert!(matches!(ElementReader::new(input), Err(IcnsError::Parse(_))));
        let input: &[u8] = b"icn";
        assert!(matches!(ElementReader::new(input), Err(IcnsError::Parse(_))));
    }

    #[test]
    fn element_reader_stops_after_error() {
        let input: &[u8] = b"icns\0\0\0\x20quux\0\0\0\x02baz!\0\0\0\x09#";
        let mut reader = ElementReader::new(input).unwrap();
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn headerless_container_probe() {
        let mut data = b"is32\0\0\0\x0a\x01\x02".to_vec();
        assert!(is_headerless_container(&data));
        data.extend_from_slice(b"s8mk\0\0\0\x09\x03");
        assert!(is_headerless_container(&data));
        data.extend_from_slice(b"trailing");
        assert!(is_headerless_container(&data));
        assert!(!is_headerless_container(b"quux\0\0\0\x09#"));
        assert!(!is_headerless_container(b"is32\0\0\0\xff\x01"));
        assert!(!is_headerless_container(b"is32\0\0\0\x00"));
        assert!(!is_headerless_container(b"\x00"));
    }

    #[test]
    fn decode_rle() {
        let data: Vec<u8> = vec![0, 12, 255, 0, 250, 0, 128, 34, 255, 0, 248,
                                 0, 1, 56, 99, 255, 0, 249, 0];
        let element = IconElement::new(OSType(*b"is32"), data);
        let image = element.decode_image().expect("failed to decode image");
        assert_eq!(image.pixel_format(), PixelFormat::RGBA);
        assert_eq!(image.width(), 16);
        assert_eq!(image.height(), 16);
        assert_eq!(&image.data()[..4], &[12, 34, 56, 255]);
    }

    #[test]
    fn decode_mask() {
        let mut data = vec![0u8; 256];
        data[2] = 127;
        let element = IconElement::new(OSType(*b"s8mk"), data);
        let image = element.decode_image().expect("failed to decode image");
        assert_eq!(image.pixel_format(), PixelFormat::Alpha);
        assert_eq!(image.width(), 16);
        assert_eq!(image.height(), 16);
        assert_eq!(image.data()[2], 127);
    }

    #[test]
    fn decode_rgb_with_mask() {
        let rgb = IconElement::new(OSType(*b"is32"), crate::packbits::pack(&[7u8; 768]));
        let mut alpha = vec![0u8; 256];
        alpha[1] = 200;
        let mask = IconElement::new(OSType(*b"s8mk"), alpha);
        let image = rgb.decode_image_with_mask(&mask).unwrap();
        assert_eq!(&image.data()[..8], &[7, 7, 7, 0, 7, 7, 7, 200]);
    }

    #[test]
    fn length_at_offset() {
        assert_eq!(read_length_at(b"icns\0\0\x01\x00", 0), Some(256));
        assert_eq!(read_length_at(b"icns\0\0", 0), None);
    }
}
