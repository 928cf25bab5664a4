//! Entity structs, §3 DATA MODEL. Grounded on `include/basic_blk.h`,
//! `include/bf_insn.h`, `include/symbol.h`. The original links these
//! entities with intrusive pointers and back-references; we key everything
//! by VMA instead (see `src/indexes.rs`) so a block split never has to chase
//! or fix up a live pointer.

use crate::decoder::mnemonic::{FlowClass, Mnemonic};
use crate::decoder::operand::Operand;
use crate::decoder::DecodedInsn;
use crate::object_reader::SymbolFlags;
use crate::types::Vma;

/// One decoded instruction, §3 `Insn`.
#[derive(Debug, Clone)]
pub struct Insn {
    pub vma: Vma,
    pub size: usize,
    pub is_data: bool,
    pub mnemonic: Mnemonic,
    pub secondary_mnemonic: Option<Mnemonic>,
    pub operands: Vec<Operand>,
    pub extra_info: Vma,
    pub parts: Vec<String>,
    pub flow_class: FlowClass,
    /// Direct branch/call/jump target, 0 if indirect or not applicable.
    pub target: Vma,
    /// Back-reference by VMA to the block currently containing this
    /// instruction (re-pointed on split, never chased through a pointer).
    pub owner_block: Vma,
}

impl Insn {
    pub fn from_decoded(decoded: DecodedInsn, owner_block: Vma) -> Self {
        Self {
            vma: decoded.vma,
            size: decoded.size,
            is_data: decoded.is_data,
            mnemonic: decoded.mnemonic,
            secondary_mnemonic: decoded.secondary_mnemonic,
            operands: decoded.operands,
            extra_info: decoded.extra_info,
            parts: decoded.parts,
            flow_class: decoded.flow_class,
            target: decoded.target,
            owner_block,
        }
    }
}

/// A maximal straight-line run of instructions, §3 `Block`.
#[derive(Debug, Clone)]
pub struct Block {
    pub vma: Vma,
    pub insns: Vec<Vma>,
    pub succ_primary: Option<Vma>,
    pub succ_secondary: Option<Vma>,
    pub symbol: Option<String>,
}

impl Block {
    pub fn new(vma: Vma) -> Self {
        Self {
            vma,
            insns: Vec::new(),
            succ_primary: None,
            succ_secondary: None,
            symbol: None,
        }
    }
}

/// A recognized function entry, §3 `Func`.
#[derive(Debug, Clone)]
pub struct Func {
    pub vma: Vma,
    pub entry_block: Vma,
    pub symbol: Option<String>,
}

/// A named, addressed symbol, §3 `Symbol`.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub value: Vma,
    pub size: u64,
    pub flags: SymbolFlags,
    pub section_name: Option<String>,
}

/// Cached bytes of one file section, §3 `SectionView`.
#[derive(Debug, Clone)]
pub struct SectionView {
    pub section_vma: Vma,
    pub bytes: Vec<u8>,
}

impl SectionView {
    pub fn length(&self) -> usize {
        self.bytes.len()
    }
}
