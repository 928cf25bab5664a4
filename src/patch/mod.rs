//! Component D: detour/trampoline patcher, §4.D. Ported from `lib/detour.c`'s
//! `bf_detour_basic_blk`/`bf_trampoline_basic_blk` and their helpers, with
//! the RIP-relative relocation idiom grounded on
//! `other_examples/d33fa60a_darfink-detour-rs__src-inline-x86-trampoline.rs.rs`'s
//! `handle_rip_relative_instruction`/`handle_relative_branch`. Every write
//! here targets file offsets in the *output* file; the input file and its
//! in-memory section cache are only ever read.

pub mod stub;

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::decoder::mnemonic::Mnemonic;
use crate::error::{Error, Result};
use crate::indexes::Indexes;
use crate::model::{Block, Insn};
use crate::object_reader::{vma_to_file_offset, ElfObjectReader, ObjectReader};
use crate::section_cache::SectionCache;
use crate::types::{Bitness, Vma};

fn is_ret(mnemonic: Mnemonic) -> bool {
    matches!(mnemonic, Mnemonic::Ret | Mnemonic::Retn | Mnemonic::Retf | Mnemonic::Retq)
}

fn block_size(indexes: &Indexes, block: &Block) -> u64 {
    block
        .insns
        .iter()
        .filter_map(|v| indexes.get_insn(*v))
        .map(|i| i.size as u64)
        .sum()
}

/// Patches the output file copy that was made at session-load time. Holds
/// read-only access to the input side (`indexes`, `cache`, `reader`) so it
/// can recover the original bytes of instructions it relocates.
pub struct Patcher<'a> {
    pub output_path: PathBuf,
    pub bitness: Bitness,
    pub indexes: &'a Indexes,
    pub cache: &'a mut SectionCache,
    pub reader: &'a dyn ObjectReader,
}

impl<'a> Patcher<'a> {
    /// `bf_detour_basic_blk`: installs a forward detour from `src_block` to
    /// `dest_block`, then NOP-pads any instruction partially overwritten by
    /// the stub.
    pub fn detour(&mut self, src_block: Vma, dest_block: Vma) -> Result<()> {
        let src = self
            .indexes
            .get_block(src_block)
            .ok_or(Error::SectionNotFound { vma: src_block })?;
        let required = self.bitness.stub_length();
        if block_size(self.indexes, src) < required as u64 {
            return Err(Error::BlockTooSmall {
                vma: src_block,
                required,
            });
        }

        let stub = stub::detour_stub_bytes(self.bitness, src_block, dest_block);
        self.write_at_vma(src_block, &stub)?;
        self.pad_till_next_insn(src_block)
    }

    /// `bf_trampoline_basic_blk`: relocates `dest_block`'s epilogue and the
    /// caller prologue bytes about to be overwritten into a NOP sled inside
    /// `dest_block`'s section, then installs the forward detour.
    pub fn trampoline(&mut self, src_block: Vma, dest_block: Vma) -> Result<()> {
        let src = self
            .indexes
            .get_block(src_block)
            .ok_or(Error::SectionNotFound { vma: src_block })?;
        let required = self.bitness.stub_length();
        if block_size(self.indexes, src) < required as u64 {
            return Err(Error::BlockTooSmall {
                vma: src_block,
                required,
            });
        }

        self.populate_trampoline_block(src_block, dest_block)?;
        self.detour(src_block, dest_block)
    }

    // -- trampoline construction -----------------------------------------

    fn populate_trampoline_block(&mut self, from: Vma, to: Vma) -> Result<()> {
        let sled_vma = self.find_sled(to)?;
        let epilogue = self.find_epilogue(sled_vma)?;
        let next_nop = self.relocate_epilogue(epilogue, sled_vma)?;
        self.pad_till_return(next_nop)?;

        let next_insn_offset = self.offset_of_insn_after_detour(from);
        self.relocate_insns(from, next_nop, from + next_insn_offset)?;

        let stub = stub::detour_stub_bytes(
            self.bitness,
            next_nop + next_insn_offset,
            from + self.bitness.stub_length() as u64,
        );
        self.write_at_vma(next_nop + next_insn_offset, &stub)
    }

    /// `get_trampoline_offset`: searches `dest_block`'s section for a run of
    /// `sled_length(bitness)` NOP bytes at or after `search_from`.
    fn find_sled(&self, search_from: Vma) -> Result<Vma> {
        let out_reader = ElfObjectReader::open(&self.output_path)?;
        let section = out_reader
            .locate_section(search_from)
            .ok_or(Error::SectionNotFound { vma: search_from })?
            .clone();
        let bytes = out_reader.read_section_bytes(&section)?;

        let start = (search_from - section.vma) as usize;
        let sled_len = self.bitness.sled_length();
        if start >= bytes.len() || bytes.len() - start < sled_len {
            return Err(Error::NoSledFound {
                vma: search_from,
                length: sled_len,
            });
        }

        bytes[start..]
            .windows(sled_len)
            .position(|w| w.iter().all(|&b| b == 0x90))
            .map(|offset| search_from + offset as u64)
            .ok_or(Error::NoSledFound {
                vma: search_from,
                length: sled_len,
            })
    }

    /// `find_epilogue`: the first non-NOP instruction at or after the sled.
    fn find_epilogue(&self, sled_vma: Vma) -> Result<Vma> {
        let mut v = sled_vma;
        loop {
            let insn = self.indexes.get_insn(v).ok_or(Error::SectionNotFound { vma: v })?;
            if insn.mnemonic != Mnemonic::Nop {
                return Ok(v);
            }
            v += insn.size as u64;
        }
    }

    /// `relocate_epilogue`: copies each instruction up to (not including)
    /// the terminating `ret*` into the sled, fixing up RIP-relative `callq`
    /// displacements. Returns the next untouched sled position.
    fn relocate_epilogue(&mut self, from: Vma, to: Vma) -> Result<Vma> {
        let insn = self
            .indexes
            .get_insn(from)
            .ok_or(Error::SectionNotFound { vma: from })?
            .clone();
        if is_ret(insn.mnemonic) {
            return Ok(to);
        }
        self.relocate_insn(&insn, to)?;
        self.relocate_epilogue(from + insn.size as u64, to + insn.size as u64)
    }

    /// `relocate_insn32`/`relocate_insn64`: copies one instruction's bytes to
    /// `to`, subtracting the relocation distance from a 64-bit `callq`'s
    /// RIP-relative displacement so it still resolves to the same target.
    fn relocate_insn(&mut self, insn: &Insn, to: Vma) -> Result<()> {
        let offset = vma_to_file_offset(&self.output_path, to)?;
        let mut bytes = self.cache.bytes_from(self.reader, insn.vma)?[..insn.size].to_vec();

        if self.bitness == Bitness::B64 && insn.mnemonic == Mnemonic::Callq && bytes.len() >= 5 {
            let reloc_diff = to as i64 - insn.vma as i64;
            let disp = i32::from_le_bytes(bytes[1..5].try_into().expect("checked len"));
            let adjusted = disp.wrapping_sub(reloc_diff as i32);
            bytes[1..5].copy_from_slice(&adjusted.to_le_bytes());
        }

        self.write_at_offset(offset, &bytes)
    }

    /// `relocate_insns`: relocates every instruction of `from`'s block in
    /// `[from, stop)` to the corresponding position starting at `to`.
    fn relocate_insns(&mut self, from: Vma, to: Vma, stop: Vma) -> Result<()> {
        let block_vma = self
            .indexes
            .get_insn(from)
            .map(|i| i.owner_block)
            .unwrap_or(from);
        let block = self
            .indexes
            .get_block(block_vma)
            .ok_or(Error::SectionNotFound { vma: block_vma })?
            .clone();

        for ivma in block.insns.iter().copied().filter(|&v| v >= from && v < stop) {
            let insn = self
                .indexes
                .get_insn(ivma)
                .ok_or(Error::SectionNotFound { vma: ivma })?
                .clone();
            self.relocate_insn(&insn, to + (ivma - from))?;
        }
        Ok(())
    }

    /// `pad_till_return`: NOPs every instruction from `vma` up to and
    /// including the next `ret*`.
    fn pad_till_return(&mut self, vma: Vma) -> Result<()> {
        let insn = match self.indexes.get_insn(vma) {
            Some(i) => i.clone(),
            None => return Ok(()),
        };
        self.write_at_vma(vma, &vec![0x90u8; insn.size])?;
        if is_ret(insn.mnemonic) {
            return Ok(());
        }
        self.pad_till_return(vma + insn.size as u64)
    }

    // -- shared helpers ----------------------------------------------------

    /// `get_offset_insn_after_detour`: byte offset (from the block's base)
    /// of the first instruction boundary at or after the detour stub.
    fn offset_of_insn_after_detour(&self, block_vma: Vma) -> u64 {
        let required = self.bitness.stub_length() as u64;
        let block = match self.indexes.get_block(block_vma) {
            Some(b) => b,
            None => return required,
        };
        block
            .insns
            .iter()
            .map(|&v| v - block_vma)
            .filter(|&off| off >= required)
            .min()
            .unwrap_or_else(|| block_size(self.indexes, block) + 1)
    }

    /// `pad_till_next_insn`: NOPs the gap between the end of a just-installed
    /// detour stub and the next known instruction boundary, so a partially
    /// overwritten instruction doesn't leave stray opcode bytes behind.
    fn pad_till_next_insn(&mut self, block_vma: Vma) -> Result<()> {
        let required = self.bitness.stub_length() as u64;
        let boundary = block_vma + required;
        if self.indexes.has_insn(boundary) {
            return Ok(());
        }

        let next = self.offset_of_insn_after_detour(block_vma) + block_vma;
        let gap = next.saturating_sub(boundary);
        if gap == 0 {
            return Ok(());
        }
        self.write_at_vma(boundary, &vec![0x90u8; gap as usize])
    }

    fn write_at_vma(&self, vma: Vma, bytes: &[u8]) -> Result<()> {
        let offset = vma_to_file_offset(&self.output_path, vma)?;
        self.write_at_offset(offset, bytes)
    }

    fn write_at_offset(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        write_file_at(&self.output_path, offset, bytes)
    }
}

fn write_file_at(path: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}
