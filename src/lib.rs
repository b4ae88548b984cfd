//! Library for reading, verifying, composing and exporting Apple Icon Image
//! (.icns) files
//!
//! See https://en.wikipedia.org/wiki/Apple_Icon_Image_format for more
//! information about the file format.
//!
//! An ICNS file is a flat sequence of tagged, length-prefixed elements:
//! images in several encodings (PNG, JPEG 2000, ARGB, run-length compressed
//! RGB, 1-bit bitmaps), their masks, nested containers for dark mode and
//! other roles, and some metadata.  [`IconFamily`](struct.IconFamily.html)
//! holds the elements of one file in order; [`IconType`](struct.IconType.html)
//! describes what each OSType means, and [`guess`](fn.guess.html) infers
//! the OSType of an arbitrary media file.
//!
//! # Example
//! ```
//! use icnsutil::{IconFamily, OSType, WriteOptions};
//!
//! let argb = b"ARGB\xFF\xFF\xFB\xFF\xFF\x00\xFB\x00\xFF\x00\xFB\x00\xFF\x00\xFB\x00";
//! let mut family = IconFamily::new();
//! let key = family.add_media(None, argb.to_vec(), None, false).unwrap();
//! assert_eq!(key, OSType(*b"ic04"));
//!
//! let mut bytes = Vec::new();
//! family.write(&mut bytes, &WriteOptions::default()).unwrap();
//! assert!(IconFamily::verify_bytes(&bytes).unwrap().is_empty());
//! ```

#![warn(missing_docs)]

mod argb;
mod element;
mod error;
mod family;
mod guess;
mod icontype;
mod image;
pub mod packbits;

#[cfg(feature = "pngio")]
mod pngio;

#[cfg(feature = "jp2io")]
mod jp2io;

pub use self::argb::ArgbImage;
pub use self::element::{is_headerless_container, ElementReader, IconElement};
pub use self::error::{IcnsError, Result};
pub use self::family::{ExportOptions, ExportReport, Exported, IconFamily, WriteOptions};
pub use self::guess::{candidates, classify_encoding, guess, guess_with_size_hint, image_size, Probe};
pub use self::icontype::{
    img_mask_pairs, png_convertible, Encoding, IconType, OSType, DARK_OSTYPE, REDUNDANT_PAIRS,
    TOC_OSTYPE,
};
pub use self::image::{Image, PixelFormat};
