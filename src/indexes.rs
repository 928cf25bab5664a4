//! Component E: entity indexes. VMA-keyed `HashMap`s stand in for the
//! original's intrusive hash tables (`bf_basic_blk.c`'s `htable_add`/
//! `htable_find` on `bf_get_bb`/`bf_get_insn`/`bf_get_func`). Symbols also get
//! a `BTreeMap` keyed by address so closest-enclosing-symbol queries are a
//! single range lookup rather than a linear scan, the way
//! `other_examples`' glaurung CFG module indexes its entities.

use std::collections::{BTreeMap, HashMap};

use crate::model::{Block, Func, Insn, Symbol};
use crate::types::Vma;

#[derive(Default)]
pub struct Indexes {
    blocks: HashMap<Vma, Block>,
    insns: HashMap<Vma, Insn>,
    funcs: HashMap<Vma, Func>,
    symbols_by_addr: BTreeMap<Vma, Symbol>,
    symbols_by_name: HashMap<String, Vma>,
}

impl Indexes {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Block ----------------------------------------------------------

    pub fn get_block(&self, vma: Vma) -> Option<&Block> {
        self.blocks.get(&vma)
    }

    pub fn get_block_mut(&mut self, vma: Vma) -> Option<&mut Block> {
        self.blocks.get_mut(&vma)
    }

    pub fn has_block(&self, vma: Vma) -> bool {
        self.blocks.contains_key(&vma)
    }

    pub fn insert_block(&mut self, block: Block) {
        self.blocks.insert(block.vma, block);
    }

    pub fn remove_block(&mut self, vma: Vma) -> Option<Block> {
        self.blocks.remove(&vma)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    // -- Insn -------------------------------------------------------------

    pub fn get_insn(&self, vma: Vma) -> Option<&Insn> {
        self.insns.get(&vma)
    }

    pub fn get_insn_mut(&mut self, vma: Vma) -> Option<&mut Insn> {
        self.insns.get_mut(&vma)
    }

    pub fn has_insn(&self, vma: Vma) -> bool {
        self.insns.contains_key(&vma)
    }

    pub fn insert_insn(&mut self, insn: Insn) {
        self.insns.insert(insn.vma, insn);
    }

    pub fn insns(&self) -> impl Iterator<Item = &Insn> {
        self.insns.values()
    }

    // -- Func -------------------------------------------------------------

    pub fn get_func(&self, vma: Vma) -> Option<&Func> {
        self.funcs.get(&vma)
    }

    pub fn get_func_by_name(&self, name: &str) -> Option<&Func> {
        self.funcs.values().find(|f| f.symbol.as_deref() == Some(name))
    }

    pub fn has_func(&self, vma: Vma) -> bool {
        self.funcs.contains_key(&vma)
    }

    pub fn insert_func(&mut self, func: Func) {
        self.funcs.insert(func.vma, func);
    }

    pub fn funcs(&self) -> impl Iterator<Item = &Func> {
        self.funcs.values()
    }

    // -- Symbol -----------------------------------------------------------

    pub fn insert_symbol(&mut self, symbol: Symbol) {
        self.symbols_by_name.insert(symbol.name.clone(), symbol.value);
        self.symbols_by_addr.insert(symbol.value, symbol);
    }

    pub fn get_symbol(&self, vma: Vma) -> Option<&Symbol> {
        self.symbols_by_addr.get(&vma)
    }

    pub fn get_symbol_by_name(&self, name: &str) -> Option<&Symbol> {
        let vma = *self.symbols_by_name.get(name)?;
        self.symbols_by_addr.get(&vma)
    }

    /// Closest-enclosing-symbol query: the symbol with the greatest address
    /// not exceeding `vma`.
    pub fn closest_symbol(&self, vma: Vma) -> Option<&Symbol> {
        self.symbols_by_addr.range(..=vma).next_back().map(|(_, s)| s)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols_by_addr.values()
    }
}
