use std::fmt;
use std::str::FromStr;

use crate::error::{IcnsError, Result};
use crate::packbits;

/// A Macintosh OSType (also known as a ResType), used in ICNS files to
/// identify the type of each icon element.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OSType(pub [u8; 4]);

impl OSType {
    /// Returns the raw four bytes of this OSType.
    pub fn bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Returns true if all four bytes are printable ASCII.
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|&byte| (0x20..0x7f).contains(&byte))
    }
}

impl fmt::Display for OSType {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        if self.is_printable() {
            for &byte in &self.0 {
                write!(out, "{}", char::from(byte))?;
            }
        } else {
            for &byte in &self.0 {
                write!(out, "\\x{:02X}", byte)?;
            }
        }
        Ok(())
    }
}

impl FromStr for OSType {
    type Err = String;

    fn from_str(input: &str) -> std::result::Result<OSType, String> {
        let bytes = input.as_bytes();
        if bytes.len() != 4 {
            Err(format!("OSType string must be 4 bytes (was {})", bytes.len()))
        } else {
            let mut raw = [0u8; 4];
            raw.clone_from_slice(bytes);
            Ok(OSType(raw))
        }
    }
}

/// The table-of-contents OSType.
pub const TOC_OSTYPE: OSType = OSType(*b"TOC ");

/// The binary OSType used for nested dark-mode containers.
pub const DARK_OSTYPE: OSType = OSType([0xFD, 0xD9, 0x2F, 0xA8]);

/// Method of encoding the payload of an icon element.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Encoding {
    /// A complete PNG file.
    Png,
    /// `ARGB` magic followed by four RLE-compressed channels.
    Argb,
    /// Three RLE-compressed channels (red, green, blue) without magic.
    Rgb,
    /// A JPEG 2000 file or codestream.
    Jp2,
    /// A binary property list.
    Plist,
    /// A nested ICNS container (with or without its 8-byte header).
    Icns,
    /// Uncompressed bitmap, mask or opaque metadata bytes.
    Bin,
}

impl Encoding {
    /// Returns the file extension conventionally used for this encoding.
    pub fn ext(self) -> &'static str {
        match self {
            Encoding::Png => "png",
            Encoding::Argb => "argb",
            Encoding::Rgb => "rgb",
            Encoding::Jp2 => "jp2",
            Encoding::Plist => "plist",
            Encoding::Icns => "icns",
            Encoding::Bin => "bin",
        }
    }

    /// True for encodings that can be recognized by a magic number.
    pub fn is_certain(self) -> bool {
        !matches!(self, Encoding::Rgb | Encoding::Bin)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        out.write_str(self.ext())
    }
}

/// Static description of one icon element type.
#[derive(Debug, PartialEq)]
pub struct IconType {
    ostype: OSType,
    encodings: &'static [Encoding],
    size: Option<(u32, u32)>,
    channels: Option<u32>,
    bits: Option<u32>,
    availability: Option<&'static str>,
    desc: &'static str,
}

use self::Encoding::{Argb, Bin, Icns, Jp2, Plist, Png, Rgb};

impl IconType {
    const fn new(
        ostype: &[u8; 4],
        encodings: &'static [Encoding],
        size: Option<(u32, u32)>,
        channels: Option<u32>,
        bits: Option<u32>,
        availability: Option<&'static str>,
        desc: &'static str,
    ) -> IconType {
        IconType {
            ostype: OSType(*ostype),
            encodings,
            size,
            channels,
            bits,
            availability,
            desc,
        }
    }

    /// Bitmap or mask with an explicit channel layout.
    const fn bitmap(
        ostype: &[u8; 4],
        size: (u32, u32),
        channels: u32,
        bits: u32,
        os: &'static str,
        desc: &'static str,
    ) -> IconType {
        IconType::new(ostype, &[Bin], Some(size), Some(channels), Some(bits), Some(os), desc)
    }

    /// Image type whose channel layout follows from its encodings.
    const fn image(
        ostype: &[u8; 4],
        encodings: &'static [Encoding],
        side: u32,
        os: Option<&'static str>,
        desc: &'static str,
    ) -> IconType {
        let (channels, bits) = match encodings {
            [.., Rgb] => (Some(3), Some(8)),
            [Argb, ..] => (Some(4), Some(8)),
            _ => (None, None),
        };
        IconType::new(ostype, encodings, Some((side, side)), channels, bits, os, desc)
    }

    /// Nested container or metadata type without pixel dimensions.
    const fn meta(
        ostype: &[u8; 4],
        encoding: &'static [Encoding],
        os: Option<&'static str>,
        desc: &'static str,
    ) -> IconType {
        IconType::new(ostype, encoding, None, None, None, os, desc)
    }

    /// Looks up the icon type for the given OSType, if any.
    pub fn from_ostype(ostype: OSType) -> Option<&'static IconType> {
        CATALOG.iter().find(|icon_type| icon_type.ostype == ostype)
    }

    /// Looks up the icon type for the given OSType, failing with
    /// `UnsupportedType` if the catalog has no such entry.
    pub fn lookup(ostype: OSType) -> Result<&'static IconType> {
        IconType::from_ostype(ostype).ok_or(IcnsError::UnsupportedType(ostype))
    }

    /// Returns every known icon type, in catalog order.
    pub fn all() -> &'static [IconType] {
        &CATALOG
    }

    /// Returns the OSType that represents this icon type.
    pub fn ostype(&self) -> OSType {
        self.ostype
    }

    /// Returns the accepted encodings, most preferred first.
    pub fn encodings(&self) -> &'static [Encoding] {
        self.encodings
    }

    /// Returns true if `encoding` is accepted by this type.
    pub fn accepts(&self, encoding: Encoding) -> bool {
        self.encodings.contains(&encoding)
    }

    /// Returns the preference rank of `encoding`, if accepted.
    pub fn preference(&self, encoding: Encoding) -> Option<usize> {
        self.encodings.iter().position(|&e| e == encoding)
    }

    /// Returns the pixel dimensions, or `None` for non-image types.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Returns the number of channels stored in the payload.
    pub fn channels(&self) -> Option<u32> {
        self.channels
    }

    /// Returns the number of bits per channel.
    pub fn bits(&self) -> Option<u32> {
        self.bits
    }

    /// Returns the first macOS version supporting this type, if known.
    pub fn availability(&self) -> Option<&'static str> {
        self.availability
    }

    /// Returns the human descriptor (`icon`, `mask`, `iconmask`, a role name
    /// for nested containers, or a note such as `16x16@2x`).
    pub fn desc(&self) -> &'static str {
        self.desc
    }

    /// True only for raw multi-channel pixel encodings (RGB or ARGB).
    pub fn is_compressible(&self) -> bool {
        self.accepts(Argb) || self.accepts(Rgb)
    }

    /// True if this type is the implicit 2x variant of a nominal size.
    pub fn is_retina(&self) -> bool {
        self.desc.contains("@2x")
    }

    /// True if every accepted encoding has a recognizable magic number.
    pub fn is_ext_certain(&self) -> bool {
        self.encodings.iter().all(|e| e.is_certain())
    }

    /// True if this type can hold raw binary data.
    pub fn is_binary(&self) -> bool {
        self.accepts(Rgb) || self.accepts(Bin)
    }

    /// Returns the 8-bit mask type that supplies the alpha channel for this
    /// RGB type, if any.
    pub fn mask_type(&self) -> Option<&'static IconType> {
        if !self.accepts(Rgb) {
            return None;
        }
        CATALOG
            .iter()
            .find(|mask| mask.desc == "mask" && mask.size == self.size)
    }

    /// Returns the expected decompressed payload length,
    /// `width * height * channels * bits / 8`, when all parts are known.
    ///
    /// # Examples
    /// ```
    /// use icnsutil::{IconType, OSType};
    /// let it32 = IconType::from_ostype(OSType(*b"it32")).unwrap();
    /// assert_eq!(it32.max_size(), Some(49152));
    /// ```
    pub fn max_size(&self) -> Option<usize> {
        match (self.size, self.channels, self.bits) {
            (Some((w, h)), Some(ch), Some(bits)) => {
                Some((w * h * ch * bits / 8) as usize)
            }
            _ => None,
        }
    }

    /// Extension used when the payload has no recognizable magic number.
    pub fn fallback_ext(&self) -> &'static str {
        match self.channels {
            Some(1) | Some(2) => self.desc,
            _ => self.encodings.last().map_or("bin", |e| e.ext()),
        }
    }

    /// Returns the base file name used when exporting this type.
    ///
    /// With `key_only`, the OSType itself is used.  Otherwise the name
    /// reflects the nominal size (`16x16`, `16x16@2x`), followed by either
    /// `-mono` for 1-bit types (`size_only`) or the icon/mask bit depths.
    pub fn file_stem(&self, key_only: bool, size_only: bool) -> String {
        if key_only {
            return self.ostype.to_string();
        }
        if self.accepts(Icns) {
            return self.desc.to_string();
        }
        let (mut w, mut h) = match self.size {
            Some(size) => size,
            None => return self.ostype.to_string(),
        };
        let mut suffix = String::new();
        if self.is_retina() {
            w /= 2;
            h /= 2;
            suffix.push_str("@2x");
        }
        let bits = self.bits.unwrap_or(0);
        if size_only {
            if bits == 1 {
                suffix.push_str("-mono");
            }
        } else {
            if self.desc == "icon" || self.desc == "iconmask" {
                suffix.push_str(&format!("-icon{}b", bits));
            }
            if self.desc == "mask" || self.desc == "iconmask" {
                suffix.push_str(&format!("-mask{}b", bits));
            }
        }
        format!("{}x{}{}", w, h, suffix)
    }

    /// Expands a compressed payload.  Types that are not compressible, and
    /// payloads whose encoding is neither ARGB nor raw RGB, are returned
    /// unchanged.  `encoding` is the result of
    /// [`classify_encoding`](../guess/fn.classify_encoding.html).
    pub fn decompress(&self, data: &[u8], encoding: Option<Encoding>) -> Result<Vec<u8>> {
        if !self.is_compressible() {
            return Ok(data.to_vec());
        }
        match encoding {
            Some(Argb) => packbits::unpack(data.get(4..).unwrap_or(&[])),
            None | Some(Rgb) => packbits::unpack(self.strip_legacy_header(data)),
            Some(_) => Ok(data.to_vec()),
        }
    }

    /// Removes the four leading bytes `it32` payloads carry before their
    /// compressed channels.
    pub fn strip_legacy_header<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        if self.has_legacy_header() {
            data.get(4..).unwrap_or(&[])
        } else {
            data
        }
    }

    /// True for the one type whose RGB payload starts with four zero bytes.
    pub fn has_legacy_header(&self) -> bool {
        self.ostype == OSType(*b"it32")
    }

    /// Splits a decompressed RGB or ARGB payload into alpha, red, green and
    /// blue channels.  RGB payloads receive a fully opaque alpha channel.
    pub fn split_channels(&self, data: &[u8]) -> Result<[Vec<u8>; 4]> {
        let channels = match self.channels {
            Some(ch @ 3) | Some(ch @ 4) if self.is_compressible() => ch as usize,
            _ => {
                return Err(IcnsError::InvalidArgument(format!(
                    "only RGB and ARGB data can be split into channels, not {}",
                    self.ostype
                )))
            }
        };
        let expected = self.max_size().unwrap_or(0);
        if data.len() != expected {
            return Err(IcnsError::SizeMismatch {
                ostype: self.ostype,
                expected,
                actual: data.len(),
            });
        }
        let per_channel = expected / channels;
        let mut planes = data.chunks(per_channel).map(|plane| plane.to_vec());
        let alpha = if channels == 3 {
            vec![u8::MAX; per_channel]
        } else {
            planes.next().unwrap_or_default()
        };
        let red = planes.next().unwrap_or_default();
        let green = planes.next().unwrap_or_default();
        let blue = planes.next().unwrap_or_default();
        Ok([alpha, red, green, blue])
    }

    /// Finds the compressible type whose decompressed size is `total` bytes
    /// for the given raw encoding (`Rgb` or `Argb`).  Several matches are
    /// ranked by the position of `encoding` in each type's preference list;
    /// a remaining tie is reported as `AmbiguousType`.
    ///
    /// # Examples
    /// ```
    /// use icnsutil::{Encoding, IconType, OSType};
    /// let matched = IconType::match_by_decompressed_size(768, Encoding::Rgb).unwrap();
    /// assert_eq!(matched.ostype(), OSType(*b"is32"));
    /// ```
    pub fn match_by_decompressed_size(
        total: usize,
        encoding: Encoding,
    ) -> Result<&'static IconType> {
        if !matches!(encoding, Rgb | Argb) {
            return Err(IcnsError::InvalidArgument(format!(
                "size matching only applies to rgb and argb data, not {}",
                encoding
            )));
        }
        let candidates: Vec<&'static IconType> = CATALOG
            .iter()
            .filter(|t| t.accepts(encoding) && t.max_size() == Some(total))
            .collect();
        crate::guess::pick_best(candidates, Some(encoding), || {
            format!("{} bytes of {} data", total, encoding)
        })
    }
}

impl fmt::Display for IconType {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        write!(out, "{}: ", self.ostype)?;
        if let Some((w, h)) = self.size {
            write!(out, "{}x{}, ", w, h)?;
            if let (Some(max), Some(ch), Some(bits)) = (self.max_size(), self.channels, self.bits) {
                write!(out, "{}ch@{}-bit={}, ", ch, bits, max)?;
            }
        }
        if !self.desc.is_empty() {
            write!(out, "{}, ", self.desc)?;
        }
        write!(out, "macOS {}+", self.availability.unwrap_or("?"))
    }
}

static CATALOG: [IconType; 45] = [
    IconType::bitmap(b"ICON", (32, 32), 1, 1, "1.0", "icon"),
    IconType::bitmap(b"ICN#", (32, 32), 2, 1, "6.0", "iconmask"),
    IconType::bitmap(b"icm#", (16, 12), 2, 1, "6.0", "iconmask"),
    IconType::bitmap(b"icm4", (16, 12), 1, 4, "7.0", "icon"),
    IconType::bitmap(b"icm8", (16, 12), 1, 8, "7.0", "icon"),
    IconType::bitmap(b"ics#", (16, 16), 2, 1, "6.0", "iconmask"),
    IconType::bitmap(b"ics4", (16, 16), 1, 4, "7.0", "icon"),
    IconType::bitmap(b"ics8", (16, 16), 1, 8, "7.0", "icon"),
    IconType::image(b"is32", &[Rgb], 16, Some("8.5"), ""),
    IconType::bitmap(b"s8mk", (16, 16), 1, 8, "8.5", "mask"),
    IconType::bitmap(b"icl4", (32, 32), 1, 4, "7.0", "icon"),
    IconType::bitmap(b"icl8", (32, 32), 1, 8, "7.0", "icon"),
    IconType::image(b"il32", &[Rgb], 32, Some("8.5"), ""),
    IconType::bitmap(b"l8mk", (32, 32), 1, 8, "8.5", "mask"),
    IconType::bitmap(b"ich#", (48, 48), 2, 1, "8.5", "iconmask"),
    IconType::bitmap(b"ich4", (48, 48), 1, 4, "8.5", "icon"),
    IconType::bitmap(b"ich8", (48, 48), 1, 8, "8.5", "icon"),
    IconType::image(b"ih32", &[Rgb], 48, Some("8.5"), ""),
    IconType::bitmap(b"h8mk", (48, 48), 1, 8, "8.5", "mask"),
    IconType::image(b"it32", &[Rgb], 128, Some("10.0"), ""),
    IconType::bitmap(b"t8mk", (128, 128), 1, 8, "10.0", "mask"),
    IconType::image(b"icp4", &[Png, Jp2, Rgb], 16, Some("10.7"), ""),
    IconType::image(b"icp5", &[Png, Jp2, Rgb], 32, Some("10.7"), ""),
    IconType::image(b"icp6", &[Png], 64, Some("10.7"), ""),
    IconType::image(b"ic07", &[Png, Jp2], 128, Some("10.7"), ""),
    IconType::image(b"ic08", &[Png, Jp2], 256, Some("10.5"), ""),
    IconType::image(b"ic09", &[Png, Jp2], 512, Some("10.5"), ""),
    IconType::image(b"ic10", &[Png, Jp2], 1024, Some("10.7"), "or 512x512@2x (10.8)"),
    IconType::image(b"ic11", &[Png, Jp2], 32, Some("10.8"), "16x16@2x"),
    IconType::image(b"ic12", &[Png, Jp2], 64, Some("10.8"), "32x32@2x"),
    IconType::image(b"ic13", &[Png, Jp2], 256, Some("10.8"), "128x128@2x"),
    IconType::image(b"ic14", &[Png, Jp2], 512, Some("10.8"), "256x256@2x"),
    IconType::image(b"ic04", &[Argb, Png, Jp2], 16, Some("11.0"), ""),
    IconType::image(b"ic05", &[Argb, Png, Jp2], 32, Some("11.0"), ""),
    IconType::image(b"icsb", &[Argb, Png, Jp2], 18, Some("11.0"), ""),
    IconType::image(b"icsB", &[Png, Jp2], 36, None, "18x18@2x"),
    IconType::image(b"sb24", &[Png, Jp2], 24, None, ""),
    IconType::image(b"SB24", &[Png, Jp2], 48, None, "24x24@2x"),
    IconType::meta(b"sbtp", &[Icns], None, "template"),
    IconType::meta(b"slct", &[Icns], None, "selected"),
    IconType::meta(&[0xFD, 0xD9, 0x2F, 0xA8], &[Icns], Some("10.14"), "dark"),
    IconType::meta(b"TOC ", &[Bin], Some("10.7"), "Table of Contents"),
    IconType::meta(b"icnV", &[Bin], None, "4-byte Icon Composer.app bundle version"),
    IconType::meta(b"name", &[Bin], None, "Unknown"),
    IconType::meta(b"info", &[Plist], None, "Info binary plist"),
];

/// Mask types and the image types they pair with, most modern last.
const IMAGE_MASK_PAIRS: [(&[u8; 4], &[&[u8; 4]]); 4] = [
    (b"s8mk", &[b"is32", b"ics8", b"ics4", b"icp4"]),
    (b"l8mk", &[b"il32", b"icl8", b"icl4", b"icp5"]),
    (b"h8mk", &[b"ih32", b"ich8", b"ich4"]),
    (b"t8mk", &[b"it32"]),
];

/// Pairs of types that describe the same dimensions; storing both is
/// redundant.
pub const REDUNDANT_PAIRS: [(OSType, OSType); 5] = [
    (OSType(*b"is32"), OSType(*b"icp4")),
    (OSType(*b"il32"), OSType(*b"icp5")),
    (OSType(*b"it32"), OSType(*b"ic07")),
    (OSType(*b"ic04"), OSType(*b"icp4")),
    (OSType(*b"ic05"), OSType(*b"icp5")),
];

/// Enumerates image/mask pairings among `available`.  Yields
/// `(Some(image), mask)` for every present image that takes an 8-bit mask
/// (with `mask` set only if that mask is present too), and `(None,
/// Some(mask))` for a mask whose images are all missing.
pub fn img_mask_pairs(available: &[OSType]) -> Vec<(Option<OSType>, Option<OSType>)> {
    let mut pairs = Vec::new();
    for &(mask, images) in &IMAGE_MASK_PAIRS {
        let mask = Some(OSType(*mask)).filter(|m| available.contains(m));
        let mut any_image = false;
        for &image in images {
            let image = OSType(*image);
            if available.contains(&image) {
                any_image = true;
                pairs.push((Some(image), mask));
            }
        }
        if mask.is_some() && !any_image {
            pairs.push((None, mask));
        }
    }
    pairs
}

/// Enumerates the entries among `available` that can be converted to PNG
/// through the channel model, with the mask to apply (if any).  ARGB and
/// 1-bit types stand alone; RGB types take the first present 8-bit mask of
/// the same dimensions.
pub fn png_convertible(available: &[OSType]) -> Vec<(OSType, Option<OSType>)> {
    let mut result = Vec::new();
    for icon_type in CATALOG.iter() {
        if !available.contains(&icon_type.ostype) {
            continue;
        }
        if icon_type.accepts(Argb) || icon_type.bits == Some(1) {
            result.push((icon_type.ostype, None));
        } else if icon_type.accepts(Rgb) {
            let mask = CATALOG
                .iter()
                .filter(|m| available.contains(&m.ostype))
                .find(|m| m.desc == "mask" && m.size == icon_type.size)
                .map(|m| m.ostype);
            result.push((icon_type.ostype, mask));
        }
    }
    result
}
