//! Component A: section byte cache. The original tool (`bf_mem_manager.c`)
//! locates the section covering a VMA, then memoizes its bytes keyed by the
//! section's base VMA so repeated decode requests in the same region don't
//! re-read the backing file. We keep the same two-step shape — locate, then
//! cache-or-load — with a `HashMap` standing in for the original's hash table.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::object_reader::{ObjectReader, SectionInfo};
use crate::types::Vma;

pub struct SectionCache {
    loaded: HashMap<Vma, Vec<u8>>,
}

impl SectionCache {
    pub fn new() -> Self {
        Self {
            loaded: HashMap::new(),
        }
    }

    /// Returns the section covering `vma`, per §4.A half-open containment.
    pub fn locate_section<'a>(&self, reader: &'a dyn ObjectReader, vma: Vma) -> Result<&'a SectionInfo> {
        reader.locate_section(vma).ok_or(Error::SectionNotFound { vma })
    }

    /// Returns the bytes of the section covering `vma`, loading and caching
    /// them on first access.
    pub fn load_section_for(
        &mut self,
        reader: &dyn ObjectReader,
        vma: Vma,
    ) -> Result<&[u8]> {
        let section = reader.locate_section(vma).ok_or(Error::SectionNotFound { vma })?.clone();

        if !self.loaded.contains_key(&section.vma) {
            let bytes = reader.read_section_bytes(&section)?;
            self.loaded.insert(section.vma, bytes);
        }

        Ok(self.loaded.get(&section.vma).expect("just inserted"))
    }

    /// Byte at `vma`, relative to its containing section's cached buffer.
    pub fn byte_at(&mut self, reader: &dyn ObjectReader, vma: Vma) -> Result<u8> {
        let section = reader.locate_section(vma).ok_or(Error::SectionNotFound { vma })?.clone();
        let bytes = self.load_section_for(reader, vma)?;
        let idx = (vma - section.vma) as usize;
        bytes.get(idx).copied().ok_or(Error::SectionReadFailed { vma })
    }

    /// A contiguous byte slice for decoding starting at `vma`, bounded by
    /// the end of its containing section.
    pub fn bytes_from(&mut self, reader: &dyn ObjectReader, vma: Vma) -> Result<&[u8]> {
        let section = reader.locate_section(vma).ok_or(Error::SectionNotFound { vma })?.clone();
        let bytes = self.load_section_for(reader, vma)?;
        let idx = (vma - section.vma) as usize;
        bytes.get(idx..).ok_or(Error::SectionReadFailed { vma })
    }

    pub fn unload_all(&mut self) {
        self.loaded.clear();
    }
}

impl Default for SectionCache {
    fn default() -> Self {
        Self::new()
    }
}
