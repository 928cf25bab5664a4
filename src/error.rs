use thiserror::Error;

use crate::types::Vma;

/// The taxonomy of failures the core can report. Every variant carries
/// enough context (a VMA, a path, a bitness) for a caller to produce a
/// precise diagnostic without re-deriving it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: object reader rejected the file format")]
    ObjectLoadFailed { path: String },

    #[error("no section covers VMA {vma:#x}")]
    SectionNotFound { vma: Vma },

    #[error("failed to read bytes of section containing VMA {vma:#x}")]
    SectionReadFailed { vma: Vma },

    #[error("disassembler returned a non-positive length decoding VMA {vma:#x}")]
    DecodeFailed { vma: Vma },

    #[error("block at {vma:#x} is smaller than the {required}-byte detour stub")]
    BlockTooSmall { vma: Vma, required: usize },

    #[error("VMA {vma:#x} could not be translated to a file offset")]
    VmaUnmapped { vma: Vma },

    #[error("no {length}-byte NOP sled found at or after {vma:#x}")]
    NoSledFound { vma: Vma, length: usize },

    #[error("patch operation requires a session opened with an output path")]
    NoOutputFile,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
