//! Recovering the type of an icon element from its bytes and file name.
//!
//! [`guess`] narrows the catalog with an ordered list of independent
//! filters and resolves what remains with one tie-break rule: prefer the
//! candidates that list the detected encoding earliest.

use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use crate::element;
use crate::error::{IcnsError, Result};
use crate::icontype::{Encoding, IconType};
use crate::packbits;

const PNG_MAGIC: &[u8; 8] = b"\x89PNG\x0d\x0a\x1a\x0a";
const ARGB_MAGIC: &[u8; 4] = b"ARGB";
const PLIST_MAGIC: &[u8; 6] = b"bplist";
const JP2_FILE_MAGIC: &[u8; 8] = b"\x00\x00\x00\x0CjP  ";
const JP2_CODESTREAM_MAGIC: &[u8; 8] = b"\xFF\x4F\xFF\x51\x00\x2F\x00\x00";

/// File name suffix marking a 2x "retina" image.
const RETINA_MARKER: &str = "@2x";

/// Role names that select a nested container type (`<role>.icns`).
const CONTAINER_ROLES: [&str; 3] = ["template", "selected", "dark"];

/// Sniffs the encoding of a payload from its magic number.  Returns `None`
/// for opaque binary data (raw RGB, bitmaps, masks), whose type can only
/// come from its tag.
///
/// # Examples
/// ```
/// use icnsutil::{classify_encoding, Encoding};
/// assert_eq!(classify_encoding(b"ARGB\x00\x00"), Some(Encoding::Argb));
/// assert_eq!(classify_encoding(b"\xff\xd8\xff\x00"), None);
/// ```
pub fn classify_encoding(data: &[u8]) -> Option<Encoding> {
    if data.starts_with(PNG_MAGIC) {
        Some(Encoding::Png)
    } else if data.starts_with(ARGB_MAGIC) {
        Some(Encoding::Argb)
    } else if data.starts_with(PLIST_MAGIC) {
        Some(Encoding::Plist)
    } else if data.starts_with(JP2_FILE_MAGIC) || data.starts_with(JP2_CODESTREAM_MAGIC) {
        Some(Encoding::Jp2)
    } else if data.starts_with(element::ICNS_MAGIC_LITERAL) || element::is_headerless_container(data) {
        Some(Encoding::Icns)
    } else {
        None
    }
}

/// Determines the pixel dimensions declared by a PNG, ARGB, RGB or JPEG 2000
/// payload.  Returns `None` for other encodings or unreadable headers.
pub fn image_size(data: &[u8], encoding: Encoding) -> Option<(u32, u32)> {
    match encoding {
        Encoding::Png => png_size(data),
        Encoding::Argb => {
            let total = packbits::get_size(data.get(4..)?);
            IconType::match_by_decompressed_size(total, Encoding::Argb)
                .ok()?
                .size()
        }
        Encoding::Rgb => {
            let data = data.strip_prefix(&[0u8; 4][..]).unwrap_or(data);
            let total = packbits::get_size(data);
            IconType::match_by_decompressed_size(total, Encoding::Rgb)
                .ok()?
                .size()
        }
        Encoding::Jp2 => jp2_size(data),
        Encoding::Plist | Encoding::Icns | Encoding::Bin => None,
    }
}

#[cfg(feature = "pngio")]
fn png_size(data: &[u8]) -> Option<(u32, u32)> {
    // A header cut short before the IHDR checksum still carries the size.
    crate::image::Image::png_dimensions(data)
        .ok()
        .or_else(|| read_dimensions(data, 16))
}

#[cfg(not(feature = "pngio"))]
fn png_size(data: &[u8]) -> Option<(u32, u32)> {
    read_dimensions(data, 16)
}

fn jp2_size(data: &[u8]) -> Option<(u32, u32)> {
    if data.starts_with(&JP2_CODESTREAM_MAGIC[..4]) {
        // SIZ marker segment: Xsiz, Ysiz
        return read_dimensions(data, 8);
    }
    let ftyp_length = BigEndian::read_u32(data.get(12..16)?) as usize;
    // signature box + file type box + header super box + image header box
    let offset = 12usize.checked_add(ftyp_length)?.checked_add(16)?;
    let (height, width) = read_dimensions(data, offset)?;
    Some((width, height))
}

fn read_dimensions(data: &[u8], offset: usize) -> Option<(u32, u32)> {
    let bytes = data.get(offset..offset.checked_add(8)?)?;
    Some((BigEndian::read_u32(&bytes[..4]), BigEndian::read_u32(&bytes[4..])))
}

/// Everything [`guess`] learned about a payload before consulting the
/// catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct Probe {
    /// Detected (or file-extension implied) encoding.
    pub encoding: Option<Encoding>,
    /// Declared pixel dimensions, for image encodings.
    pub size: Option<(u32, u32)>,
    /// Whether the name carries the 2x marker.
    pub retina: bool,
    /// Container role taken from the name, for nested containers.
    pub role: Option<&'static str>,
    /// Expected dimensions supplied by the caller for opaque payloads.
    pub size_hint: Option<(u32, u32)>,
}

impl Probe {
    /// Inspects `data` and its optional source `name`.
    pub fn new(data: &[u8], name: Option<&str>, size_hint: Option<(u32, u32)>) -> Probe {
        let mut encoding = classify_encoding(data);
        if encoding.is_none() && name.map_or(false, |n| n.ends_with(".rgb")) {
            encoding = Some(Encoding::Rgb);
        }
        let size = encoding.and_then(|e| image_size(data, e));
        let retina = name
            .and_then(stem)
            .map_or(false, |s| s.to_lowercase().ends_with(RETINA_MARKER));
        let role = match (encoding, name) {
            (Some(Encoding::Icns), Some(name)) => CONTAINER_ROLES
                .iter()
                .copied()
                .find(|role| name.ends_with(&format!("{}.icns", role))),
            _ => None,
        };
        Probe { encoding, size, retina, role, size_hint }
    }
}

type Filter = fn(&Probe, &IconType) -> bool;

/// The elimination filters, applied in order.  Each one is independent of
/// the others.
const FILTERS: [(&str, Filter); 4] = [
    ("retina", retina_matches),
    ("encoding", encoding_matches),
    ("role", role_matches),
    ("size hint", size_hint_matches),
];

fn retina_matches(probe: &Probe, icon_type: &IconType) -> bool {
    probe.retina == icon_type.is_retina()
}

fn encoding_matches(probe: &Probe, icon_type: &IconType) -> bool {
    match probe.encoding {
        Some(encoding) => probe.size == icon_type.size() && icon_type.accepts(encoding),
        None => !icon_type.is_ext_certain(),
    }
}

fn role_matches(probe: &Probe, icon_type: &IconType) -> bool {
    match (probe.encoding, probe.role) {
        (Some(_), Some(role)) => icon_type.desc() == role,
        _ => true,
    }
}

fn size_hint_matches(probe: &Probe, icon_type: &IconType) -> bool {
    match (probe.encoding, probe.size_hint) {
        (None, Some(hint)) => icon_type.size() == Some(hint),
        _ => true,
    }
}

/// Returns the catalog entries that survive every filter, in catalog order.
pub fn candidates(probe: &Probe) -> Vec<&'static IconType> {
    IconType::all()
        .iter()
        .filter(|icon_type| FILTERS.iter().all(|(_, filter)| filter(probe, *icon_type)))
        .collect()
}

/// Guesses the icon type of `data`, using the optional source file `name`:
///
/// - a name whose stem is an OSType (e.g. `ic07.png`) selects it directly,
/// - a `@2x` suffix before the extension marks a retina image,
/// - `template.icns`, `selected.icns` or `dark.icns` selects the nested
///   container role,
/// - a `.rgb` extension marks opaque data as compressed RGB.
///
/// Fails with `AmbiguousType` if more than one type remains.
///
/// # Examples
/// ```
/// use icnsutil::{guess, OSType};
/// let icon_type = guess(b"anything", Some("ic07.png")).unwrap();
/// assert_eq!(icon_type.ostype(), OSType(*b"ic07"));
/// ```
pub fn guess(data: &[u8], name: Option<&str>) -> Result<&'static IconType> {
    guess_with_size_hint(data, name, None)
}

/// Like [`guess`], but opaque binary payloads are also filtered by the
/// expected pixel dimensions `size_hint`.
pub fn guess_with_size_hint(
    data: &[u8],
    name: Option<&str>,
    size_hint: Option<(u32, u32)>,
) -> Result<&'static IconType> {
    if let Some(stem) = name.and_then(stem) {
        let explicit = IconType::all()
            .iter()
            .find(|icon_type| stem.as_bytes() == icon_type.ostype().bytes());
        if let Some(icon_type) = explicit {
            return Ok(icon_type);
        }
    }
    let probe = Probe::new(data, name, size_hint);
    log::trace!("guessing type for {:?}: {:?}", name, probe);
    pick_best(candidates(&probe), probe.encoding, || {
        name.unwrap_or("<data>").to_string()
    })
}

/// Resolves a candidate list to a single type.  With a known encoding,
/// ties are broken by that encoding's position in each candidate's
/// preference list; whatever still ties is reported as `AmbiguousType`.
pub(crate) fn pick_best<F>(
    candidates: Vec<&'static IconType>,
    encoding: Option<Encoding>,
    describe: F,
) -> Result<&'static IconType>
where
    F: FnOnce() -> String,
{
    if let [only] = candidates[..] {
        return Ok(only);
    }
    let remaining = match encoding {
        Some(encoding) if !candidates.is_empty() => {
            let rank = |t: &IconType| t.preference(encoding).unwrap_or(usize::MAX);
            let best = candidates.iter().map(|t| rank(*t)).min().unwrap_or(usize::MAX);
            let best: Vec<&'static IconType> =
                candidates.into_iter().filter(|t| rank(*t) == best).collect();
            if let [only] = best[..] {
                return Ok(only);
            }
            best
        }
        _ => candidates,
    };
    Err(IcnsError::AmbiguousType {
        name: describe(),
        candidates: remaining.iter().map(|t| t.ostype()).collect(),
    })
}

fn stem(name: &str) -> Option<&str> {
    Path::new(name).file_stem().and_then(|s| s.to_str())
}
