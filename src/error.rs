//! Error types shared by every layer of the crate.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::icontype::OSType;

/// Result type for ICNS operations.
pub type Result<T> = std::result::Result<T, IcnsError>;

/// Errors that can occur while reading, classifying, converting or writing
/// ICNS data.
#[derive(Error, Debug)]
pub enum IcnsError {
    /// The input is not an ICNS container (missing or malformed top-level
    /// header).  Fatal: nothing read from the source can be trusted.
    #[error("not an ICNS file: {0}")]
    Parse(String),

    /// The tag is not part of the static type catalog.
    #[error("unsupported icns type: {0}")]
    UnsupportedType(OSType),

    /// Type inference could not narrow the candidates down to one.
    #[error("could not determine type for {name} - one of {}", CandidateList(.candidates))]
    AmbiguousType {
        /// Source name the guess was made for (or `<data>`).
        name: String,
        /// Every candidate that survived the elimination filters.
        candidates: Vec<OSType>,
    },

    /// Decompressed length disagrees with the declared size of a type.
    #[error("invalid data length for {ostype}: {actual} != {expected}")]
    SizeMismatch {
        /// The type whose size was checked.
        ostype: OSType,
        /// Expected decompressed length.
        expected: usize,
        /// Actual decompressed length.
        actual: usize,
    },

    /// Container-level defect (size field, image/mask pairing, redundant
    /// entries, unexpected encoding).
    #[error("{0}")]
    Structural(String),

    /// A caller violated an operation contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed compressed stream or chunk header.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Underlying I/O or image codec failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

struct CandidateList<'a>(&'a [OSType]);

impl fmt::Display for CandidateList<'_> {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        write!(out, "[")?;
        for (index, ostype) in self.0.iter().enumerate() {
            if index > 0 {
                write!(out, ", ")?;
            }
            write!(out, "'{}'", ostype)?;
        }
        write!(out, "]")
    }
}
