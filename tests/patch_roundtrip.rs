//! End-to-end coverage of §8 invariants 8 ("detour round-trip") against a
//! minimal hand-built ELF64 executable, exercised through the public
//! `Session` surface rather than `object`'s own write path — the fixture is
//! assembled byte-for-byte the way `tests/fixtures/*.bc` are checked in for
//! `llvm-bitcode-rs`, except generated in-process so the VMAs stay in sync
//! with the assertions below.

use std::io::Write;

use bf_recon::object_reader::vma_to_file_offset;
use bf_recon::patch::stub::detour_stub_bytes;
use bf_recon::{Bitness, SessionOptions};

const TEXT_VMA: u64 = 0x40_0000;

/// Builds a minimal ELF64 executable: header + one `.text` section holding
/// `text` at `TEXT_VMA`, plus the `.shstrtab` section names require.
fn minimal_elf64(entry: u64, text: &[u8]) -> Vec<u8> {
    let shstrtab: &[u8] = b"\0.text\0.shstrtab\0";
    let text_off = 64u64;
    let shstrtab_off = text_off + text.len() as u64;
    let shoff = shstrtab_off + shstrtab.len() as u64;

    let mut buf = Vec::new();

    // e_ident
    buf.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    buf.extend_from_slice(&[0u8; 8]);
    buf.extend_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
    buf.extend_from_slice(&62u16.to_le_bytes()); // e_machine = EM_X86_64
    buf.extend_from_slice(&1u32.to_le_bytes()); // e_version
    buf.extend_from_slice(&entry.to_le_bytes()); // e_entry
    buf.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    buf.extend_from_slice(&shoff.to_le_bytes()); // e_shoff
    buf.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    buf.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    buf.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
    buf.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
    buf.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
    buf.extend_from_slice(&3u16.to_le_bytes()); // e_shnum
    buf.extend_from_slice(&2u16.to_le_bytes()); // e_shstrndx
    assert_eq!(buf.len(), 64);

    buf.extend_from_slice(text);
    buf.extend_from_slice(shstrtab);
    assert_eq!(buf.len() as u64, shoff);

    // section 0: NULL
    buf.extend_from_slice(&[0u8; 64]);

    // section 1: .text
    buf.extend_from_slice(&1u32.to_le_bytes()); // sh_name -> ".text"
    buf.extend_from_slice(&1u32.to_le_bytes()); // sh_type = SHT_PROGBITS
    buf.extend_from_slice(&0x6u64.to_le_bytes()); // sh_flags = ALLOC|EXECINSTR
    buf.extend_from_slice(&TEXT_VMA.to_le_bytes()); // sh_addr
    buf.extend_from_slice(&text_off.to_le_bytes()); // sh_offset
    buf.extend_from_slice(&(text.len() as u64).to_le_bytes()); // sh_size
    buf.extend_from_slice(&0u32.to_le_bytes()); // sh_link
    buf.extend_from_slice(&0u32.to_le_bytes()); // sh_info
    buf.extend_from_slice(&16u64.to_le_bytes()); // sh_addralign
    buf.extend_from_slice(&0u64.to_le_bytes()); // sh_entsize

    // section 2: .shstrtab
    buf.extend_from_slice(&7u32.to_le_bytes()); // sh_name -> ".shstrtab"
    buf.extend_from_slice(&3u32.to_le_bytes()); // sh_type = SHT_STRTAB
    buf.extend_from_slice(&0u64.to_le_bytes()); // sh_flags
    buf.extend_from_slice(&0u64.to_le_bytes()); // sh_addr
    buf.extend_from_slice(&shstrtab_off.to_le_bytes()); // sh_offset
    buf.extend_from_slice(&(shstrtab.len() as u64).to_le_bytes()); // sh_size
    buf.extend_from_slice(&0u32.to_le_bytes()); // sh_link
    buf.extend_from_slice(&0u32.to_le_bytes()); // sh_info
    buf.extend_from_slice(&1u64.to_le_bytes()); // sh_addralign
    buf.extend_from_slice(&0u64.to_le_bytes()); // sh_entsize

    buf
}

fn write_fixture(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(bytes).unwrap();
    path
}

#[test]
fn detour_round_trip_writes_canonical_stub_and_pads_tail() {
    let _ = env_logger::builder().is_test(true).try_init();

    // 20 NOPs then retq: a 21-byte block, comfortably over the 14-byte
    // 64-bit stub length.
    let mut text = vec![0x90u8; 20];
    text.push(0xc3);

    let elf = minimal_elf64(TEXT_VMA, &text);
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "in.elf", &elf);
    let output = dir.path().join("out.elf");

    let mut session = SessionOptions::new(&input)
        .output_path(&output)
        .load()
        .unwrap();
    assert_eq!(session.bitness(), Bitness::B64);

    session.disasm_from_vma(TEXT_VMA, false).unwrap();
    let dest = TEXT_VMA + 0x1000;
    session.detour_block(TEXT_VMA, dest).unwrap();

    let stub_off = vma_to_file_offset(&output, TEXT_VMA).unwrap();
    let out_bytes = std::fs::read(&output).unwrap();
    let stub_len = Bitness::B64.stub_length();
    let expected = detour_stub_bytes(Bitness::B64, TEXT_VMA, dest);
    assert_eq!(&out_bytes[stub_off as usize..stub_off as usize + stub_len], &expected[..]);

    // Bytes from the end of the stub to the next known instruction boundary
    // (the retq at text[20]) must all be NOP.
    let pad_start = stub_off as usize + stub_len;
    let pad_end = stub_off as usize + 20;
    assert!(out_bytes[pad_start..pad_end].iter().all(|&b| b == 0x90));

    // The input file is untouched.
    let in_bytes = std::fs::read(&input).unwrap();
    assert_eq!(in_bytes, elf);
}

#[test]
fn patch_without_output_path_fails_with_no_output_file() {
    let mut text = vec![0x90u8; 20];
    text.push(0xc3);
    let elf = minimal_elf64(TEXT_VMA, &text);
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "in.elf", &elf);

    let mut session = SessionOptions::new(&input).load().unwrap();
    session.disasm_from_vma(TEXT_VMA, false).unwrap();
    let err = session.detour_block(TEXT_VMA, TEXT_VMA + 0x1000).unwrap_err();
    assert!(matches!(err, bf_recon::Error::NoOutputFile));
}

#[test]
fn disasm_from_entry_follows_the_elf_header_entry_point() {
    let mut text = vec![0x90u8; 4];
    text.push(0xc3);
    let elf = minimal_elf64(TEXT_VMA + 2, &text);
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "in.elf", &elf);

    let mut session = SessionOptions::new(&input).load().unwrap();
    let block = session.disasm_from_entry().unwrap();
    assert_eq!(block.vma, TEXT_VMA + 2);
}

/// §8 invariant 9 / concrete scenario 6: a trampoline relocates the callee's
/// epilogue and the about-to-be-overwritten caller prologue into a pre-cut
/// NOP sled, then detours the caller into the callee.
#[test]
fn trampoline_round_trip_relocates_epilogue_prologue_and_back_detour() {
    const SRC_VMA: u64 = TEXT_VMA;
    const DEST_VMA: u64 = TEXT_VMA + 0x1000;
    const SLED_LEN: usize = 42; // Bitness::B64 sled length
    const STUB_LEN: usize = 14; // Bitness::B64 stub length

    // src: 20 NOPs then retq. Comfortably over the 14-byte stub length, and
    // the 14th byte lands exactly on an instruction boundary.
    let mut src_code = vec![0x90u8; 20];
    src_code.push(0xc3);

    // dest: a 42-byte 0x90 sled, then the epilogue `xor %eax,%eax ; retq`.
    let mut dest_code = vec![0x90u8; SLED_LEN];
    dest_code.extend_from_slice(&[0x31, 0xc0]); // xor eax,eax
    dest_code.push(0xc3); // retq

    let gap = (DEST_VMA - SRC_VMA) as usize - src_code.len();
    let mut text = src_code.clone();
    text.extend(std::iter::repeat(0u8).take(gap));
    text.extend_from_slice(&dest_code);

    let elf = minimal_elf64(SRC_VMA, &text);
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "in.elf", &elf);
    let output = dir.path().join("out.elf");

    let mut session = SessionOptions::new(&input)
        .output_path(&output)
        .load()
        .unwrap();
    session.disasm_from_vma(SRC_VMA, false).unwrap();
    session.disasm_from_vma(DEST_VMA, false).unwrap();
    session.trampoline_block(SRC_VMA, DEST_VMA).unwrap();

    let out_bytes = std::fs::read(&output).unwrap();
    let src_off = vma_to_file_offset(&output, SRC_VMA).unwrap() as usize;
    let dest_off = vma_to_file_offset(&output, DEST_VMA).unwrap() as usize;

    // Caller: forward detour stub, untouched tail, unmoved retq.
    let expected_fwd_stub = detour_stub_bytes(Bitness::B64, SRC_VMA, DEST_VMA);
    assert_eq!(&out_bytes[src_off..src_off + STUB_LEN], &expected_fwd_stub[..]);
    assert!(out_bytes[src_off + STUB_LEN..src_off + 20].iter().all(|&b| b == 0x90));
    assert_eq!(out_bytes[src_off + 20], 0xc3);

    // Callee sled: relocated epilogue, then relocated caller prologue, then
    // a back-detour stub targeting src + stub_length, then untouched NOP.
    let sled = &out_bytes[dest_off..dest_off + SLED_LEN + 3];
    assert_eq!(&sled[0..2], &[0x31, 0xc0]); // relocated xor eax,eax
    assert!(sled[2..16].iter().all(|&b| b == 0x90)); // relocated 14-byte prologue (all nop)

    let expected_back_stub = detour_stub_bytes(Bitness::B64, DEST_VMA + 16, SRC_VMA + STUB_LEN as u64);
    assert_eq!(&sled[16..30], &expected_back_stub[..]);
    assert!(sled[30..].iter().all(|&b| b == 0x90));

    // The original epilogue's source bytes (now overwritten by the padding
    // pass) are gone; only the relocated copy at the sled start remains.
    assert_eq!(&out_bytes[dest_off + SLED_LEN..dest_off + SLED_LEN + 3], &[0x90, 0x90, 0x90]);
}
