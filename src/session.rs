//! Session root aggregate and library surface, §3 `Session` / §6 "Library
//! surface exposed to callers". Grounded on `lib/binary_file.c`'s
//! `load_binary_file`/`close_binary_file`/`disassemble_binary_file_entry`/
//! `disassemble_binary_file_symbol`, with the builder-style configuration of
//! `driver/driver.rs` kept for `SessionOptions`.

use std::path::{Path, PathBuf};

use crate::disasm::Disassembler;
use crate::error::{Error, Result};
use crate::indexes::Indexes;
use crate::model::{Block, Func, Symbol};
use crate::object_reader::{ElfObjectReader, ObjectReader, SymbolFlags};
use crate::patch::Patcher;
use crate::section_cache::SectionCache;
use crate::types::{Bitness, Vma};

/// Builder for a `Session`, mirroring the teacher's `driver::Options` idiom.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    bitness_override: Option<Bitness>,
    /// Whether the disassembly engine recurses into call targets (true) or
    /// only registers a `Func` guess at the direct target without walking
    /// it (false). Defaults to true.
    follow_calls: bool,
}

impl SessionOptions {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: None,
            bitness_override: None,
            follow_calls: true,
        }
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn bitness(mut self, bitness: Bitness) -> Self {
        self.bitness_override = Some(bitness);
        self
    }

    pub fn follow_calls(mut self, follow: bool) -> Self {
        self.follow_calls = follow;
        self
    }

    pub fn load(self) -> Result<Session> {
        Session::load(self)
    }
}

/// The root aggregate: the external object handle, bitness, optional output
/// path, the five entity indexes, and the section byte cache. One `Session`
/// is single-threaded and non-reentrant (§5); independent sessions over
/// distinct files are fully independent.
pub struct Session {
    reader: ElfObjectReader,
    cache: SectionCache,
    indexes: Indexes,
    bitness: Bitness,
    output_path: Option<PathBuf>,
    follow_calls: bool,
}

impl Session {
    /// `load_binary_file`: opens the target, copies it to `output_path` if
    /// one was supplied (Component F), and populates the Symbol index.
    pub fn load(options: SessionOptions) -> Result<Self> {
        let reader = ElfObjectReader::open(&options.input_path)?;
        let bitness = options.bitness_override.unwrap_or_else(|| reader.bitness());

        if let Some(out) = &options.output_path {
            std::fs::copy(&options.input_path, out)?;
        }

        let mut indexes = Indexes::new();
        for sym in reader.symbols() {
            indexes.insert_symbol(Symbol {
                name: sym.name.clone(),
                value: sym.value,
                size: sym.size,
                flags: sym.flags,
                section_name: sym.section_name.clone(),
            });
        }

        Ok(Self {
            reader,
            cache: SectionCache::new(),
            indexes,
            bitness,
            output_path: options.output_path,
            follow_calls: options.follow_calls,
        })
    }

    /// `close_binary_file`: drops the section cache. The entity indexes are
    /// dropped with the `Session` itself — there is nothing left pointing
    /// outside it once a caller's last reference goes away.
    pub fn close(mut self) -> bool {
        self.cache.unload_all();
        true
    }

    pub fn bitness(&self) -> Bitness {
        self.bitness
    }

    pub fn input_path(&self) -> &Path {
        self.reader.path()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    fn disassembler(&mut self) -> Disassembler<'_> {
        Disassembler {
            indexes: &mut self.indexes,
            cache: &mut self.cache,
            reader: &self.reader,
            bitness: self.bitness,
            follow_calls: self.follow_calls,
        }
    }

    /// `disassemble_binary_file_entry`.
    pub fn disasm_from_entry(&mut self) -> Result<&Block> {
        let entry = self.reader.entry();
        let vma = self.disassembler().disasm_from_vma(entry, true)?;
        self.indexes.get_block(vma).ok_or(Error::SectionNotFound { vma })
    }

    /// `disassemble_binary_file_symbol`.
    pub fn disasm_from_symbol(&mut self, symbol_vma: Vma, is_function: bool) -> Result<&Block> {
        let vma = self.disassembler().disasm_from_symbol(symbol_vma, is_function)?;
        self.indexes.get_block(vma).ok_or(Error::SectionNotFound { vma })
    }

    pub fn disasm_from_vma(&mut self, vma: Vma, is_function: bool) -> Result<&Block> {
        let vma = self.disassembler().disasm_from_vma(vma, is_function)?;
        self.indexes.get_block(vma).ok_or(Error::SectionNotFound { vma })
    }

    /// Seeds disassembly at every `STT_FUNC` symbol — skipping undefined
    /// (`SHN_UNDEF`-equivalent, i.e. zero-value) entries — dispatching each
    /// through `disasm_from_symbol`. SPEC_FULL.md §4.C.1 addition.
    pub fn disasm_all_functions(&mut self) -> Result<()> {
        let targets: Vec<Vma> = self
            .reader
            .symbols()
            .iter()
            .filter(|s| s.flags.contains(SymbolFlags::FUNCTION) && s.value != 0)
            .map(|s| s.value)
            .collect();

        for vma in targets {
            if let Err(err) = self.disassembler().disasm_from_symbol(vma, true) {
                log::warn!("failed to disassemble function at {vma:#x}: {err}");
            }
        }
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    pub fn get_block(&self, vma: Vma) -> Option<&Block> {
        self.indexes.get_block(vma)
    }

    pub fn get_insn(&self, vma: Vma) -> Option<&crate::model::Insn> {
        self.indexes.get_insn(vma)
    }

    pub fn get_func(&self, vma: Vma) -> Option<&Func> {
        self.indexes.get_func(vma)
    }

    pub fn get_func_by_name(&self, name: &str) -> Option<&Func> {
        self.indexes.get_func_by_name(name)
    }

    pub fn get_symbol(&self, vma: Vma) -> Option<&Symbol> {
        self.indexes.get_symbol(vma)
    }

    pub fn symbol_for_vma(&self, vma: Vma) -> Option<&Symbol> {
        self.indexes.closest_symbol(vma)
    }

    // -- iterators ------------------------------------------------------------

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.indexes.blocks()
    }

    pub fn insns(&self) -> impl Iterator<Item = &crate::model::Insn> {
        self.indexes.insns()
    }

    pub fn funcs(&self) -> impl Iterator<Item = &Func> {
        self.indexes.funcs()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.indexes.symbols()
    }

    // -- patching ------------------------------------------------------------

    fn patcher(&mut self) -> Result<Patcher<'_>> {
        let output_path = self
            .output_path
            .clone()
            .ok_or(Error::NoOutputFile)?;
        Ok(Patcher {
            output_path,
            bitness: self.bitness,
            indexes: &self.indexes,
            cache: &mut self.cache,
            reader: &self.reader,
        })
    }

    pub fn detour_block(&mut self, src_block: Vma, dest_block: Vma) -> Result<()> {
        self.patcher()?.detour(src_block, dest_block)
    }

    pub fn detour_func(&mut self, src_func: Vma, dest_func: Vma) -> Result<()> {
        let src = self.get_func(src_func).ok_or(Error::SectionNotFound { vma: src_func })?.entry_block;
        let dest = self.get_func(dest_func).ok_or(Error::SectionNotFound { vma: dest_func })?.entry_block;
        self.detour_block(src, dest)
    }

    pub fn trampoline_block(&mut self, src_block: Vma, dest_block: Vma) -> Result<()> {
        self.patcher()?.trampoline(src_block, dest_block)
    }

    pub fn trampoline_func(&mut self, src_func: Vma, dest_func: Vma) -> Result<()> {
        let src = self.get_func(src_func).ok_or(Error::SectionNotFound { vma: src_func })?.entry_block;
        let dest = self.get_func(dest_func).ok_or(Error::SectionNotFound { vma: dest_func })?.entry_block;
        self.trampoline_block(src, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_options_default_follow_calls_is_true() {
        let opts = SessionOptions::new("/bin/true");
        assert!(opts.follow_calls);
    }

    #[test]
    fn session_options_builder_overrides_defaults() {
        let opts = SessionOptions::new("/bin/true")
            .output_path("/tmp/out")
            .bitness(Bitness::B32)
            .follow_calls(false);
        assert_eq!(opts.output_path, Some(PathBuf::from("/tmp/out")));
        assert_eq!(opts.bitness_override, Some(Bitness::B32));
        assert!(!opts.follow_calls);
    }
}
