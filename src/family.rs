use byteorder::{BigEndian, ByteOrder};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::argb::ArgbImage;
use crate::element::{ElementReader, IconElement, ICNS_MAGIC_LITERAL, ICON_ELEMENT_HEADER_LENGTH};
use crate::error::{IcnsError, Result};
use crate::guess::{classify_encoding, guess};
use crate::icontype::{
    img_mask_pairs, png_convertible, Encoding, IconType, OSType, REDUNDANT_PAIRS, TOC_OSTYPE,
};
use crate::image::Image;

/// The length of an icon family header, in bytes:
const ICON_FAMILY_HEADER_LENGTH: u32 = 8;

/// Options for [`IconFamily::write`](struct.IconFamily.html#method.write).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteOptions {
    /// Regenerate the table of contents and store it as the first element.
    pub toc: bool,
}

impl Default for WriteOptions {
    fn default() -> WriteOptions {
        WriteOptions { toc: true }
    }
}

/// Options for [`IconFamily::export`](struct.IconFamily.html#method.export).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExportOptions {
    /// Output directory.  Defaults to the source path plus `.export`, which
    /// is created if needed; an explicit directory must already exist.
    pub outdir: Option<PathBuf>,
    /// Only export files with one of these extensions (e.g. `png`).
    pub allowed_ext: Option<Vec<String>>,
    /// Name files by OSType (`ic07.png`) instead of size (`128x128.png`).
    pub key_suffix: bool,
    /// Convert ARGB, RGB (with mask) and 1-bit entries to PNG files.
    pub convert_png: bool,
    /// Write ARGB and RGB entries without run-length compression.
    pub decompress: bool,
    /// Export nested containers as well, depth first.
    pub recursive: bool,
}

/// Where one element ended up after an export.
#[derive(Clone, Debug, PartialEq)]
pub enum Exported {
    /// The element was written to this file.
    File(PathBuf),
    /// The element was a nested container that was exported in turn.
    Nested(ExportReport),
}

/// Result of [`IconFamily::export`](struct.IconFamily.html#method.export).
#[derive(Clone, Debug, PartialEq)]
pub struct ExportReport {
    /// The container that was exported, if it came from a file.
    pub source: Option<PathBuf>,
    /// The directory the files were written to.
    pub outdir: PathBuf,
    /// Exported elements, in export order.  An image and its mask that were
    /// merged into one PNG both point at the same file.
    pub entries: Vec<(OSType, Exported)>,
}

/// A set of icons stored in a single ICNS file.  Elements keep their
/// insertion order and every OSType occurs at most once.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IconFamily {
    elements: Vec<IconElement>,
    source: Option<PathBuf>,
}

impl IconFamily {
    /// Creates a new, empty icon family.
    pub fn new() -> IconFamily {
        IconFamily::default()
    }

    /// Returns true if the icon family contains no icons nor any other
    /// elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the number of elements, including any table of contents.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns the elements in order.
    pub fn elements(&self) -> &[IconElement] {
        &self.elements
    }

    /// Returns the OSTypes of all elements, in order.
    pub fn keys(&self) -> Vec<OSType> {
        self.elements.iter().map(IconElement::ostype).collect()
    }

    /// Returns the element with the given OSType, if present.
    pub fn get(&self, ostype: OSType) -> Option<&IconElement> {
        self.elements.iter().find(|el| el.ostype == ostype)
    }

    /// Returns true if the family holds a table of contents element.
    pub fn has_toc(&self) -> bool {
        self.get(TOC_OSTYPE).is_some()
    }

    /// The file this family was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Inserts an element.  An element with the same OSType is replaced in
    /// place and returned; otherwise the new element is appended.
    pub fn insert(&mut self, element: IconElement) -> Option<IconElement> {
        match self.elements.iter_mut().find(|el| el.ostype == element.ostype) {
            Some(existing) => Some(std::mem::replace(existing, element)),
            None => {
                self.elements.push(element);
                None
            }
        }
    }

    /// Removes and returns the element with the given OSType.
    pub fn remove_media(&mut self, ostype: OSType) -> Option<IconElement> {
        let index = self.elements.iter().position(|el| el.ostype == ostype)?;
        Some(self.elements.remove(index))
    }

    /// Adds a media file.  Without an explicit `key`, the type is guessed
    /// from the data and the optional file `name` (see
    /// [`guess`](fn.guess.html)).  Fails if an element with the same key
    /// already exists, unless `force` is set.  Nested containers are stored
    /// without their 8-byte `icns` header.
    pub fn add_media(
        &mut self,
        key: Option<OSType>,
        mut data: Vec<u8>,
        name: Option<&str>,
        force: bool,
    ) -> Result<OSType> {
        let ostype = match key {
            Some(ostype) => ostype,
            None => guess(&data, name)?.ostype(),
        };
        if !force && self.get(ostype).is_some() {
            return Err(IcnsError::InvalidArgument(format!(
                "image with identical key \"{}\". File: {}",
                ostype,
                name.unwrap_or("-")
            )));
        }
        let is_container = IconType::from_ostype(ostype).map_or(false, |t| t.accepts(Encoding::Icns));
        if is_container && data.starts_with(ICNS_MAGIC_LITERAL) {
            if data.len() < ICON_FAMILY_HEADER_LENGTH as usize {
                return Err(IcnsError::Corrupt(format!(
                    "truncated icns header for {}: {} bytes",
                    ostype,
                    data.len()
                )));
            }
            data.drain(..ICON_FAMILY_HEADER_LENGTH as usize);
        }
        log::debug!("adding {} ({} bytes)", ostype, data.len());
        self.insert(IconElement::new(ostype, data));
        Ok(ostype)
    }

    /// Reads the file at `path` and adds it with
    /// [`add_media`](#method.add_media), using the path for type guessing.
    pub fn add_media_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        key: Option<OSType>,
        force: bool,
    ) -> Result<OSType> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let name = path.to_string_lossy();
        self.add_media(key, data, Some(name.as_ref()), force)
    }

    /// Encodes the image into the family using the given icon type, in the
    /// first of its encodings that can be produced: PNG (with the `pngio`
    /// feature), ARGB, or compressed RGB.  RGB types also get their 8-bit
    /// mask element.  Returns an error if the image has the wrong
    /// dimensions for the selected type.
    pub fn add_icon_with_type(&mut self, image: &Image, ostype: OSType) -> Result<()> {
        let icon_type = IconType::lookup(ostype)?;
        if icon_type.size() != Some((image.width(), image.height())) {
            return Err(IcnsError::InvalidArgument(format!(
                "{}x{} image does not fit {}",
                image.width(),
                image.height(),
                ostype
            )));
        }
        for &encoding in icon_type.encodings() {
            match encoding {
                Encoding::Png if cfg!(feature = "pngio") => {
                    self.insert(IconElement::new(ostype, encode_png(image)?));
                    return Ok(());
                }
                Encoding::Argb | Encoding::Rgb => {
                    let argb = ArgbImage::from_image(image);
                    self.insert(IconElement::new(ostype, argb.encode_for(icon_type, true)?));
                    if let Some(mask_type) = icon_type.mask_type() {
                        let mask = argb.mask_data(8, false)?;
                        self.insert(IconElement::new(mask_type.ostype(), mask));
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(IcnsError::InvalidArgument(format!(
            "cannot encode an image as {}",
            ostype
        )))
    }

    /// Decodes the element with the given OSType into an RGBA image.  RGB
    /// elements are combined with their mask element when one is present.
    pub fn get_image(&self, ostype: OSType) -> Result<Image> {
        let element = self.get(ostype).ok_or_else(|| {
            IcnsError::InvalidArgument(format!(
                "the icon family does not contain a '{}' element",
                ostype
            ))
        })?;
        let mask = png_convertible(&self.keys())
            .into_iter()
            .find(|&(image, _)| image == ostype)
            .and_then(|(_, mask)| mask)
            .and_then(|mask| self.get(mask));
        match mask {
            Some(mask) => element.decode_image_with_mask(mask),
            None => element.decode_image(),
        }
    }

    /// Reads an icon family from an ICNS file.  A repeated OSType replaces
    /// the earlier element in place.
    pub fn read<R: Read>(reader: R) -> Result<IconFamily> {
        let mut family = IconFamily::new();
        for element in ElementReader::new(reader)? {
            let element = element?;
            if element.icon_type().is_none() {
                log::warn!(
                    "unknown media type: {}, {} bytes",
                    element.ostype,
                    element.data.len()
                );
            }
            family.insert(element);
        }
        Ok(family)
    }

    /// Reads the ICNS file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<IconFamily> {
        let path = path.as_ref();
        let mut family = IconFamily::read(BufReader::new(File::open(path)?))?;
        family.source = Some(path.to_path_buf());
        Ok(family)
    }

    /// Returns the elements that are written, excluding any stored table of
    /// contents.
    fn content(&self) -> impl Iterator<Item = &IconElement> {
        self.elements.iter().filter(|el| el.ostype != TOC_OSTYPE)
    }

    /// Builds the table of contents payload from the current elements: one
    /// OSType and total element length per entry.
    pub fn table_of_contents(&self) -> Vec<u8> {
        let mut toc = Vec::new();
        for element in self.content() {
            push_header(&mut toc, element.ostype, element.total_length());
        }
        toc
    }

    /// Returns the encoded length of the file, in bytes, including the
    /// length of the header.
    pub fn total_length(&self, toc: bool) -> u32 {
        let mut length = ICON_FAMILY_HEADER_LENGTH;
        for element in self.content() {
            length += element.total_length();
            if toc {
                length += ICON_ELEMENT_HEADER_LENGTH;
            }
        }
        if toc {
            length += ICON_ELEMENT_HEADER_LENGTH;
        }
        length
    }

    /// Assembles the complete file: header, regenerated table of contents
    /// (if enabled) and every other element in order.
    pub fn to_bytes(&self, toc: bool) -> Vec<u8> {
        let total = self.total_length(toc);
        let mut output = Vec::with_capacity(total as usize);
        push_header(&mut output, OSType(*ICNS_MAGIC_LITERAL), total);
        if toc {
            let contents = self.table_of_contents();
            push_header(
                &mut output,
                TOC_OSTYPE,
                ICON_ELEMENT_HEADER_LENGTH + contents.len() as u32,
            );
            output.extend_from_slice(&contents);
        }
        for element in self.content() {
            push_header(&mut output, element.ostype, element.total_length());
            output.extend_from_slice(&element.data);
        }
        log::debug!("assembled {} bytes (toc: {})", output.len(), toc);
        output
    }

    /// Writes the icon family to an ICNS file.  The whole file is assembled
    /// in memory first.
    pub fn write<W: Write>(&self, mut writer: W, options: &WriteOptions) -> Result<()> {
        writer.write_all(&self.to_bytes(options.toc))?;
        Ok(())
    }

    /// Writes the icon family to the file at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P, options: &WriteOptions) -> Result<()> {
        fs::write(path, self.to_bytes(options.toc))?;
        Ok(())
    }

    /// Describes the elements, one per line (see
    /// [`describe_file`](#method.describe_file)).
    pub fn describe(&self, verbose: bool, indent: usize) -> String {
        describe_elements(self.elements.iter(), verbose, indent)
    }

    /// Describes the elements of the ICNS file at `path`, one line each:
    /// `key: N bytes, ext: name`.  With `verbose`, every line also gives the
    /// element's offset within the file.
    pub fn describe_file<P: AsRef<Path>>(path: P, verbose: bool, indent: usize) -> Result<String> {
        let elements = ElementReader::open(path)?.collect::<Result<Vec<_>>>()?;
        Ok(describe_elements(elements.iter(), verbose, indent))
    }

    /// Checks an ICNS file and returns every problem found.  An empty list
    /// means the file is valid.  Only a missing `icns` header is fatal.
    pub fn verify_bytes(data: &[u8]) -> Result<Vec<IcnsError>> {
        let reader = ElementReader::new(data)?;
        let declared = reader.declared_length();
        let mut issues = Vec::new();
        let mut all_keys = Vec::new();
        let mut bin_keys = Vec::new();
        for element in reader {
            let element = match element {
                Ok(element) => element,
                Err(err) => {
                    issues.push(err);
                    break;
                }
            };
            all_keys.push(element.ostype);
            verify_element(&element, &mut bin_keys, &mut issues);
        }
        if declared as usize != data.len() {
            issues.push(IcnsError::Structural(format!(
                "header file-size != actual size: {} != {}",
                declared,
                data.len()
            )));
        }
        for pair in img_mask_pairs(&bin_keys) {
            let message = match pair {
                (Some(image), None) => format!("Missing key pair: {} found, mask missing.", image),
                (None, Some(mask)) => format!("Missing key pair: {} found, image missing.", mask),
                _ => continue,
            };
            issues.push(IcnsError::Structural(message));
        }
        for &(a, b) in &REDUNDANT_PAIRS {
            if all_keys.contains(&a) && all_keys.contains(&b) {
                issues.push(IcnsError::Structural(format!(
                    "Redundant keys: {} and {} have identical size.",
                    a, b
                )));
            }
        }
        Ok(issues)
    }

    /// Checks the ICNS file at `path` (see
    /// [`verify_bytes`](#method.verify_bytes)).
    pub fn verify_file<P: AsRef<Path>>(path: P) -> Result<Vec<IcnsError>> {
        IconFamily::verify_bytes(&fs::read(path)?)
    }

    /// Writes every element to its own file.  See
    /// [`ExportOptions`](struct.ExportOptions.html) for naming, filtering,
    /// conversion and recursion.
    pub fn export(&self, options: &ExportOptions) -> Result<ExportReport> {
        let outdir = match options.outdir {
            Some(ref outdir) if !outdir.is_dir() => {
                return Err(IcnsError::InvalidArgument(format!(
                    "\"{}\" is not a directory. Abort.",
                    outdir.display()
                )))
            }
            Some(ref outdir) => outdir.clone(),
            None => {
                let mut outdir = self
                    .source
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("in-memory.icns"))
                    .into_os_string();
                outdir.push(".export");
                let outdir = PathBuf::from(outdir);
                fs::create_dir_all(&outdir)?;
                outdir
            }
        };
        log::debug!("exporting {} elements to {}", self.len(), outdir.display());

        let mut report = ExportReport {
            source: self.source.clone(),
            outdir,
            entries: Vec::new(),
        };
        let mut keys = self.keys();
        if options.convert_png {
            for (image, mask) in png_convertible(&keys) {
                let path = match self.export_png(&report.outdir, image, mask, options.key_suffix)? {
                    Some(path) => path,
                    None => continue,
                };
                report.entries.push((image, Exported::File(path.clone())));
                keys.retain(|&key| key != image);
                if let Some(mask) = mask {
                    report.entries.push((mask, Exported::File(path)));
                    keys.retain(|&key| key != mask);
                }
            }
        }

        let mut allowed_ext = options.allowed_ext.clone();
        let mut cleanup = false;
        if options.recursive {
            if let Some(ref mut allowed) = allowed_ext {
                if !allowed.iter().any(|ext| ext == "icns") {
                    allowed.push("icns".to_string());
                    cleanup = true;
                }
            }
        }
        for key in keys {
            if let Some(path) = self.export_single(&report.outdir, key, options, allowed_ext.as_deref())? {
                report.entries.push((key, Exported::File(path)));
            }
        }

        if options.recursive {
            for (_, exported) in report.entries.iter_mut() {
                let path = match exported {
                    Exported::File(path) if path.extension().map_or(false, |ext| ext == "icns") => {
                        path.clone()
                    }
                    _ => continue,
                };
                let nested = IconFamily::open(&path)?.export(&ExportOptions {
                    outdir: None,
                    ..options.clone()
                })?;
                *exported = Exported::Nested(nested);
                if cleanup {
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(report)
    }

    fn export_single(
        &self,
        outdir: &Path,
        key: OSType,
        options: &ExportOptions,
        allowed_ext: Option<&[String]>,
    ) -> Result<Option<PathBuf>> {
        let element = match self.get(key) {
            Some(element) => element,
            None => return Ok(None),
        };
        let encoding = classify_encoding(&element.data);
        let mut data = element.data.clone();
        if encoding == Some(Encoding::Icns) && !data.starts_with(ICNS_MAGIC_LITERAL) {
            let mut header = Vec::with_capacity(data.len() + 8);
            push_header(&mut header, OSType(*ICNS_MAGIC_LITERAL), ICON_FAMILY_HEADER_LENGTH + data.len() as u32);
            header.append(&mut data);
            data = header;
        }
        let (stem, ext) = match element.icon_type() {
            Some(icon_type) => {
                if options.decompress {
                    data = icon_type.decompress(&data, encoding)?;
                }
                let fallback = if icon_type.is_compressible() { "rgb" } else { "bin" };
                (icon_type.file_stem(options.key_suffix, false), encoding.map_or(fallback, Encoding::ext))
            }
            None => (key.to_string(), encoding.map_or("unknown", Encoding::ext)),
        };
        if let Some(allowed) = allowed_ext {
            if !allowed.iter().any(|allowed| allowed == ext) {
                return Ok(None);
            }
        }
        let path = outdir.join(format!("{}.{}", stem, ext));
        log::debug!("exporting {} to {}", key, path.display());
        fs::write(&path, &data)?;
        Ok(Some(path))
    }

    fn export_png(
        &self,
        outdir: &Path,
        image: OSType,
        mask: Option<OSType>,
        key_suffix: bool,
    ) -> Result<Option<PathBuf>> {
        let element = match self.get(image) {
            Some(element) => element,
            None => return Ok(None),
        };
        if !matches!(element.encoding(), None | Some(Encoding::Argb)) {
            return Ok(None);
        }
        let icon_type = IconType::lookup(image)?;
        let decoded = match mask.and_then(|mask| self.get(mask)) {
            Some(mask) => element.decode_image_with_mask(mask)?,
            None => element.decode_image()?,
        };
        let path = outdir.join(format!("{}.png", icon_type.file_stem(key_suffix, true)));
        log::debug!("converting {} to {}", image, path.display());
        fs::write(&path, encode_png(&decoded)?)?;
        Ok(Some(path))
    }
}

impl fmt::Display for IconFamily {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        let source = self
            .source
            .as_ref()
            .map_or_else(|| "-mem-".to_string(), |path| path.display().to_string());
        writeln!(out, "File: {}", source)?;
        out.write_str(&self.describe(false, 2))
    }
}

fn push_header(output: &mut Vec<u8>, ostype: OSType, length: u32) {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, length);
    output.extend_from_slice(ostype.bytes());
    output.extend_from_slice(&buf);
}

fn verify_element(
    element: &IconElement,
    bin_keys: &mut Vec<OSType>,
    issues: &mut Vec<IcnsError>,
) {
    let icon_type = match IconType::lookup(element.ostype) {
        Ok(icon_type) => icon_type,
        Err(err) => return issues.push(err),
    };
    let encoding = element.encoding();
    if encoding.is_none() {
        bin_keys.push(element.ostype);
    }
    let expected = match encoding {
        Some(encoding) => icon_type.accepts(encoding),
        None => icon_type.is_binary(),
    };
    if !expected {
        let accepted: Vec<&str> = icon_type.encodings().iter().map(|e| e.ext()).collect();
        issues.push(IcnsError::Structural(format!(
            "Unexpected type for key {}: {} != [{}]",
            element.ostype,
            encoding.map_or("binary", Encoding::ext),
            accepted.join(", ")
        )));
    }
    if matches!(
        encoding,
        Some(Encoding::Png) | Some(Encoding::Jp2) | Some(Encoding::Icns) | Some(Encoding::Plist)
    ) {
        return;
    }
    if icon_type.has_legacy_header() && !element.data.starts_with(&[0; 4]) {
        let header = &element.data[..element.data.len().min(4)];
        issues.push(IcnsError::Structural(format!(
            "Unexpected it32 data header: {:02X?}",
            header
        )));
    }
    let data = match icon_type.decompress(&element.data, encoding) {
        Ok(data) => data,
        Err(err) => return issues.push(err),
    };
    match icon_type.max_size() {
        Some(expected) if data.len() != expected => issues.push(IcnsError::SizeMismatch {
            ostype: element.ostype,
            expected,
            actual: data.len(),
        }),
        _ => {}
    }
}

fn describe_elements<'a, I>(elements: I, verbose: bool, indent: usize) -> String
where
    I: Iterator<Item = &'a IconElement>,
{
    let mut text = String::new();
    let mut offset = ICON_FAMILY_HEADER_LENGTH as usize;
    for element in elements {
        let size = element.data.len();
        text.push_str(&" ".repeat(indent));
        text.push_str(&format!("{}: {} bytes", element.ostype, size));
        if verbose {
            text.push_str(&format!(", offset: {}", offset));
            offset += size + ICON_ELEMENT_HEADER_LENGTH as usize;
        }
        match element.ostype.bytes() {
            b"name" => {
                text.push_str(&format!(", value: \"{}\"\n", String::from_utf8_lossy(&element.data)));
                continue;
            }
            b"icnV" if size == 4 => {
                let version = BigEndian::read_f32(&element.data);
                text.push_str(&format!(", value: {:?}\n", version));
                continue;
            }
            _ => {}
        }
        let encoding = element.encoding();
        match element.icon_type() {
            Some(icon_type) => {
                let ext = encoding
                    .or_else(|| icon_type.encodings().last().copied())
                    .map_or("binary", Encoding::ext);
                text.push_str(&format!(", {}: {}\n", ext, icon_type.file_stem(false, true)));
            }
            None => {
                let what = match encoding {
                    Some(encoding) => encoding.ext().to_string(),
                    None => {
                        let head = &element.data[..size.min(6)];
                        format!("b'{}'", head.escape_ascii())
                    }
                };
                text.push_str(&format!(": UNKNOWN TYPE: {}\n", what));
            }
        }
    }
    text
}

#[cfg(feature = "pngio")]
fn encode_png(image: &Image) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    image.write_png(&mut output)?;
    Ok(output)
}

#[cfg(not(feature = "pngio"))]
fn encode_png(_image: &Image) -> Result<Vec<u8>> {
    Err(IcnsError::InvalidArgument(
        "PNG encoding requires the `pngio` feature".to_string(),
    ))
}
