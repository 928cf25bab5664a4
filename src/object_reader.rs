//! The object-file reader is an external collaborator (§6): this module is a
//! thin binding to the `object` crate. No ELF/COFF/Mach-O header is parsed by
//! hand here; every field below is read straight off `object::read::File`.

use bitflags::bitflags;
use object::read::{Object, ObjectSection, ObjectSymbol, ObjectSymbolTable};

use crate::error::{Error, Result};
use crate::types::{Bitness, Vma};

bitflags! {
    /// Symbol type bitfield, §3 `Symbol`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolFlags: u32 {
        const LOCAL     = 1 << 0;
        const GLOBAL    = 1 << 1;
        const FUNCTION  = 1 << 2;
        const OBJECT    = 1 << 3;
        const DYNAMIC   = 1 << 4;
        const WEAK      = 1 << 5;
        const DEBUGGING = 1 << 6;
        const COMMON    = 1 << 7;
    }
}

#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub name: String,
    pub vma: Vma,
    pub size: u64,
    pub file_offset: u64,
    pub has_contents: bool,
}

impl SectionInfo {
    /// Half-open containment per §4.A: `[vma, vma+size)`.
    pub fn contains(&self, vma: Vma) -> bool {
        vma >= self.vma && vma < self.vma + self.size
    }
}

#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub name: String,
    pub value: Vma,
    pub size: u64,
    pub flags: SymbolFlags,
    pub section_name: Option<String>,
}

/// Everything component C needs from the underlying object, abstracted so
/// the disassembly engine never touches `object::read` directly.
pub trait ObjectReader {
    fn bitness(&self) -> Bitness;
    fn entry(&self) -> Vma;
    fn sections(&self) -> &[SectionInfo];
    fn symbols(&self) -> &[SymbolInfo];
    fn locate_section(&self, vma: Vma) -> Option<&SectionInfo>;
    fn read_section_bytes(&self, section: &SectionInfo) -> Result<Vec<u8>>;
}

/// Reads a target through the `object` crate. Owns the raw file bytes so
/// `object::read::File` (which borrows its backing buffer) can be
/// re-parsed cheaply on demand rather than stored as a self-referential type.
pub struct ElfObjectReader {
    path: std::path::PathBuf,
    data: Vec<u8>,
    bitness: Bitness,
    entry: Vma,
    sections: Vec<SectionInfo>,
    symbols: Vec<SymbolInfo>,
}

impl ElfObjectReader {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = std::fs::read(&path)?;
        let file = object::File::parse(&*data).map_err(|_| Error::ObjectLoadFailed {
            path: path.display().to_string(),
        })?;

        let bitness = if file.is_64() { Bitness::B64 } else { Bitness::B32 };
        let entry = file.entry();

        let sections = file
            .sections()
            .map(|sec| SectionInfo {
                name: sec.name().unwrap_or("").to_string(),
                vma: sec.address(),
                size: sec.size(),
                file_offset: sec.file_range().map(|(off, _)| off).unwrap_or(0),
                has_contents: sec.file_range().is_some(),
            })
            .collect();

        let mut symbols = Vec::new();
        for sym in file.symbols() {
            push_symbol(sym, false, &mut symbols);
        }
        if let Some(dynsyms) = file.dynamic_symbol_table() {
            for sym in dynsyms.symbols() {
                push_symbol(sym, true, &mut symbols);
            }
        }

        Ok(Self {
            path,
            data,
            bitness,
            entry,
            sections,
            symbols,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// Shared by both the regular and dynamic symbol tables, which `object`
/// exposes as distinct iterator types over the same `ObjectSymbol` trait.
fn push_symbol<'a>(sym: impl ObjectSymbol<'a>, dynamic: bool, out: &mut Vec<SymbolInfo>) {
    let name = sym.name().unwrap_or("").to_string();
    if name.is_empty() && sym.address() == 0 {
        return;
    }

    let mut flags = SymbolFlags::empty();
    flags |= if sym.is_global() {
        SymbolFlags::GLOBAL
    } else {
        SymbolFlags::LOCAL
    };
    if sym.is_weak() {
        flags |= SymbolFlags::WEAK;
    }
    if dynamic {
        flags |= SymbolFlags::DYNAMIC;
    }
    match sym.kind() {
        object::SymbolKind::Text => flags |= SymbolFlags::FUNCTION,
        object::SymbolKind::Data => flags |= SymbolFlags::OBJECT,
        object::SymbolKind::Common => flags |= SymbolFlags::COMMON,
        object::SymbolKind::Debug => flags |= SymbolFlags::DEBUGGING,
        _ => {}
    }

    out.push(SymbolInfo {
        name,
        value: sym.address(),
        size: sym.size(),
        flags,
        section_name: None,
    });
}

impl ObjectReader for ElfObjectReader {
    fn bitness(&self) -> Bitness {
        self.bitness
    }

    fn entry(&self) -> Vma {
        self.entry
    }

    fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    fn symbols(&self) -> &[SymbolInfo] {
        &self.symbols
    }

    fn locate_section(&self, vma: Vma) -> Option<&SectionInfo> {
        self.sections.iter().find(|s| s.has_contents && s.contains(vma))
    }

    fn read_section_bytes(&self, section: &SectionInfo) -> Result<Vec<u8>> {
        let file = object::File::parse(&*self.data).map_err(|_| Error::ObjectLoadFailed {
            path: self.path.display().to_string(),
        })?;
        let sec = file
            .sections()
            .find(|s| s.address() == section.vma && s.name().unwrap_or("") == section.name)
            .ok_or(Error::SectionNotFound { vma: section.vma })?;
        sec.data()
            .map(|d| d.to_vec())
            .map_err(|_| Error::SectionReadFailed { vma: section.vma })
    }
}

/// Walks the *output* file's section headers to translate a VMA to a file
/// offset, per §4.D. Re-opens and re-parses the file on every call, matching
/// the original tool's per-patch `elf_begin`/`elf_end` cycle (§9's "no
/// buffering across patch operations").
pub fn vma_to_file_offset(output_path: &std::path::Path, vma: Vma) -> Result<u64> {
    let data = std::fs::read(output_path)?;
    let file = object::File::parse(&*data).map_err(|_| Error::ObjectLoadFailed {
        path: output_path.display().to_string(),
    })?;
    for sec in file.sections() {
        let addr = sec.address();
        let size = sec.size();
        if vma >= addr && vma < addr + size {
            if let Some((file_off, _)) = sec.file_range() {
                return Ok(file_off + (vma - addr));
            }
        }
    }
    Err(Error::VmaUnmapped { vma })
}
