//! Detour stub byte layouts, §4.D. Ported verbatim (as byte sequences) from
//! `bf_detour32`/`bf_detour64` in `lib/detour.c`; `src/backend/x86/linker/elf.rs`'s
//! raw ELF section-header constants are not needed here since `object`
//! exposes file offsets directly, but its byte-buffer-literal style for
//! fixed-layout structures is what this module follows.

use crate::types::{Bitness, Vma};

/// The detour stub that redirects execution from `from` to `to`.
///
/// - 32-bit: 5 bytes, `E9 rel32` (a relative `JMP`).
/// - 64-bit: 14 bytes, `PUSH imm32-low ; MOV DWORD PTR [rsp+4], imm32-high ; RET`
///   — an absolute jump built entirely out of stack pushes, trashing no
///   registers.
pub fn detour_stub_bytes(bitness: Bitness, from: Vma, to: Vma) -> Vec<u8> {
    match bitness {
        Bitness::B32 => {
            let rel = (to as i64 - from as i64 - 5) as i32;
            let mut buf = Vec::with_capacity(5);
            buf.push(0xe9);
            buf.extend_from_slice(&rel.to_le_bytes());
            buf
        }
        Bitness::B64 => {
            let lo = (to & 0xffff_ffff) as u32;
            let hi = (to >> 32) as u32;
            let mut buf = Vec::with_capacity(14);
            buf.push(0x68);
            buf.extend_from_slice(&lo.to_le_bytes());
            buf.extend_from_slice(&[0xc7, 0x44, 0x24, 0x04]);
            buf.extend_from_slice(&hi.to_le_bytes());
            buf.push(0xc3);
            buf
        }
    }
}
