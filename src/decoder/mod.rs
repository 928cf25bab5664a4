//! Component B: instruction decoder and semantic classifier.
//!
//! `lib/bf_disasm.c`'s `binary_file_fprintf` drove a state machine keyed by
//! `part_counter` over the raw text fragments libopcodes handed back one at
//! a time. We keep that state machine — `State` below is the Rust transcription
//! of the "State machine summary" in §4.D — but bind it to `iced_x86`'s
//! `GasFormatter`, whose `FormatterOutput::write` callback plays the same
//! role libopcodes' per-part printf callback did.

pub mod mnemonic;
pub mod operand;
pub mod register;

use iced_x86::{Decoder, DecoderOptions, Formatter, FormatterOutput, FormatterTextKind, GasFormatter, Instruction};

use crate::decoder::mnemonic::{classify, is_data_pseudo, is_macro_prefix, FlowClass, Mnemonic};
use crate::decoder::operand::{parse_operand, Operand};
use crate::error::{Error, Result};
use crate::types::{Bitness, Vma};

/// Models `target2` from the original cursor: the first direct literal
/// target observed while decoding wins; later operands never overwrite it.
/// See SPEC_FULL.md §9.1 decision 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetLatch {
    Unset,
    Captured(Vma),
}

impl TargetLatch {
    fn capture(&mut self, vma: Vma) {
        if vma != 0 && *self == TargetLatch::Unset {
            *self = TargetLatch::Captured(vma);
        }
    }

    pub fn get(self) -> Vma {
        match self {
            TargetLatch::Unset => 0,
            TargetLatch::Captured(v) => v,
        }
    }
}

/// The part-counter state machine's states, per §4.D's summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectMnemonic,
    ExpectSecondaryMnemonic,
    ExpectOperand1,
    ExpectSep1,
    ExpectOperand2,
    ExpectSep2OrComment,
    ExpectOperand3,
    ExpectComment,
    Done,
}

/// One fully decoded instruction, the result of `decode_one`.
#[derive(Debug, Clone)]
pub struct DecodedInsn {
    pub vma: Vma,
    pub size: usize,
    pub is_data: bool,
    pub mnemonic: Mnemonic,
    pub secondary_mnemonic: Option<Mnemonic>,
    pub operands: Vec<Operand>,
    pub extra_info: Vma,
    pub parts: Vec<String>,
    pub flow_class: FlowClass,
    /// Direct branch/call target, 0 if indirect or not applicable.
    pub target: Vma,
}

/// Collects the GAS-formatter's per-part callback stream, standing in for
/// libopcodes' per-part printf callback (§4.B, §6 "disassembler engine").
#[derive(Default)]
struct PartSink {
    parts: Vec<String>,
}

impl FormatterOutput for PartSink {
    fn write(&mut self, text: &str, _kind: FormatterTextKind) {
        if !text.trim().is_empty() {
            self.parts.push(text.trim().to_string());
        }
    }
}

/// Decodes one instruction at `vma` from `bytes` (which must start exactly
/// at `vma`). Mirrors `disasm_single_insn`/`binary_file_fprintf`: drives the
/// external disassembler for one instruction, replays its per-part callback
/// stream through the state machine, and classifies control flow.
pub fn decode_one(bytes: &[u8], vma: Vma, bitness: Bitness) -> Result<DecodedInsn> {
    let mut decoder = Decoder::with_ip(bitness.bits(), bytes, vma, DecoderOptions::NONE);
    if !decoder.can_decode() {
        return Err(Error::DecodeFailed { vma });
    }

    let mut instr = Instruction::default();
    decoder.decode_out(&mut instr);
    let size = instr.len();
    if size == 0 || instr.is_invalid() {
        return Err(Error::DecodeFailed { vma });
    }

    let mut formatter = GasFormatter::new();
    formatter.options_mut().set_uppercase_hex(false);
    let mut sink = PartSink::default();
    formatter.format(&instr, &mut sink);

    let parsed = run_state_machine(&sink.parts);

    let flow_class = classify(parsed.mnemonic_text.as_deref().unwrap_or(""));
    let mut target_latch = TargetLatch::Unset;
    if matches!(
        flow_class,
        FlowClass::Branches | FlowClass::Breaks | FlowClass::Calls
    ) {
        for op in &parsed.operands {
            if let Some(t) = op.direct_target() {
                target_latch.capture(t);
            }
        }
    }

    let extra_info = rip_relative_hint(&instr);

    let mnemonic_text = parsed.mnemonic_text.unwrap_or_default();
    let is_data = is_data_pseudo(&mnemonic_text);
    let mnemonic = Mnemonic::parse(&mnemonic_text);
    let secondary_mnemonic = parsed.secondary_mnemonic_text.map(|s| Mnemonic::parse(&s));

    Ok(DecodedInsn {
        vma,
        size,
        is_data,
        mnemonic,
        secondary_mnemonic,
        operands: parsed.operands,
        extra_info,
        parts: sink.parts,
        flow_class,
        target: target_latch.get(),
    })
}

/// The comment hint in the original populated `extra_info` with the resolved
/// absolute target of a RIP-relative memory operand. `iced_x86` exposes that
/// resolution directly rather than through a formatter comment string.
fn rip_relative_hint(instr: &Instruction) -> Vma {
    if instr.is_ip_rel_memory_operand() {
        instr.ip_rel_memory_address()
    } else {
        0
    }
}

struct ParsedParts {
    mnemonic_text: Option<String>,
    secondary_mnemonic_text: Option<String>,
    operands: Vec<Operand>,
}

/// Replays the formatter's part stream through the §4.D state machine.
/// Unexpected transitions are logged and leave the corresponding slot unset;
/// per §4.D they never abort decoding of the enclosing instruction.
fn run_state_machine(parts: &[String]) -> ParsedParts {
    let mut state = State::ExpectMnemonic;
    let mut mnemonic_text = None;
    let mut secondary_mnemonic_text = None;
    let mut operands = Vec::new();

    for part in parts {
        state = match state {
            State::ExpectMnemonic => {
                mnemonic_text = Some(part.clone());
                if is_macro_prefix(part) {
                    State::ExpectSecondaryMnemonic
                } else {
                    State::ExpectOperand1
                }
            }
            State::ExpectSecondaryMnemonic => {
                secondary_mnemonic_text = Some(part.clone());
                State::ExpectOperand1
            }
            State::ExpectOperand1 => {
                if let Some(op) = parse_operand(part) {
                    operands.push(op);
                    State::ExpectSep1
                } else {
                    log::warn!("unrecognized first operand {part:?}");
                    State::ExpectSep1
                }
            }
            State::ExpectSep1 => {
                if part == "," {
                    State::ExpectOperand2
                } else {
                    log::warn!("expected operand separator, found {part:?}");
                    State::ExpectOperand2
                }
            }
            State::ExpectOperand2 => {
                if let Some(op) = parse_operand(part) {
                    operands.push(op);
                } else {
                    log::warn!("unrecognized second operand {part:?}");
                }
                State::ExpectSep2OrComment
            }
            State::ExpectSep2OrComment => {
                if part == "," {
                    State::ExpectOperand3
                } else {
                    State::ExpectComment
                }
            }
            State::ExpectOperand3 => {
                if let Some(op) = parse_operand(part) {
                    operands.push(op);
                } else {
                    log::warn!("unrecognized third operand {part:?}");
                }
                State::ExpectComment
            }
            State::ExpectComment => State::Done,
            State::Done => State::Done,
        };
    }

    ParsedParts {
        mnemonic_text,
        secondary_mnemonic_text,
        operands,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_latch_keeps_first_capture() {
        let mut latch = TargetLatch::Unset;
        latch.capture(0x1000);
        latch.capture(0x2000);
        assert_eq!(latch.get(), 0x1000);
    }

    #[test]
    fn target_latch_ignores_zero() {
        let mut latch = TargetLatch::Unset;
        latch.capture(0);
        assert_eq!(latch.get(), 0);
    }

    #[test]
    fn state_machine_parses_two_operand_instruction() {
        let parts: Vec<String> = ["movl", "$0x5", ",", "%eax"]
            .into_iter()
            .map(String::from)
            .collect();
        let parsed = run_state_machine(&parts);
        assert_eq!(parsed.mnemonic_text.as_deref(), Some("movl"));
        assert_eq!(parsed.operands.len(), 2);
    }

    #[test]
    fn state_machine_handles_macro_prefixed_instruction() {
        let parts: Vec<String> = ["rep", "stosb"].into_iter().map(String::from).collect();
        let parsed = run_state_machine(&parts);
        assert_eq!(parsed.mnemonic_text.as_deref(), Some("rep"));
        assert_eq!(parsed.secondary_mnemonic_text.as_deref(), Some("stosb"));
    }

    #[test]
    fn decode_one_classifies_retq_as_ends_flow() {
        // c3 = retq
        let insn = decode_one(&[0xc3], 0x1000, Bitness::B64).unwrap();
        assert_eq!(insn.flow_class, FlowClass::Ends);
        assert_eq!(insn.size, 1);
    }

    #[test]
    fn decode_one_classifies_call_rel32_and_captures_target() {
        // e8 00 00 00 00 = callq next_insn (rel32 = 0)
        let insn = decode_one(&[0xe8, 0x00, 0x00, 0x00, 0x00], 0x1000, Bitness::B64).unwrap();
        assert_eq!(insn.flow_class, FlowClass::Calls);
        assert_eq!(insn.target, 0x1005);
    }
}
