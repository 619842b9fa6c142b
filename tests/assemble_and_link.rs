//! End-to-end assemble-then-link scenarios, one per concrete example.

use cdm8asm::assembler;
use cdm8asm::linker::{self, ImageFormat, LinkOptions, Mode};

fn assemble_ok(source: &str) -> String {
    assembler::assemble(source, &[], false, false).unwrap().object
}

#[test]
fn scenario_1_plain_absolute_bytes() {
    let object = assemble_ok("asect 0x10\nfoo: dc 1,2,3\nend\n");
    assert!(object.contains("ABS 10: 01 02 03"));
    assert!(!object.contains("NAME"));

    let opts = LinkOptions { mode: Mode::Absolute, low_bound: 0x20, format: ImageFormat::Raw };
    let result = linker::link(&[object], &opts).unwrap();
    assert_eq!(&result.image[0x10..0x13], &[1, 2, 3]);
    assert!(result.image[..0x10].iter().all(|&b| b == 0));
    assert!(result.image[0x13..].iter().all(|&b| b == 0));
}

#[test]
fn scenario_2_relative_section_at_default_low_bound() {
    let object = assemble_ok("rsect main\nstart> ldi r0, 7\nhalt\nend\n");
    assert!(object.contains("NAME main"));
    assert!(object.contains("DATA d0 07 d4"));

    let opts = LinkOptions { mode: Mode::Relative, low_bound: 0x20, format: ImageFormat::Raw };
    let result = linker::link(&[object], &opts).unwrap();
    assert_eq!(&result.image[0x20..0x23], &[0xd0, 0x07, 0xd4]);
    assert!(result.listing.contains("start = 20"));
}

#[test]
fn scenario_3_cross_section_external_resolves_through_the_linker() {
    let a = assemble_ok("rsect main\nx: ext\nldi r0, x\nhalt\nend\n");
    assert!(a.contains("XTRN x:"));
    let b = assemble_ok("rsect lib\nx> dc 0x2a\nend\n");

    let opts = LinkOptions { mode: Mode::Relative, low_bound: 0x20, format: ImageFormat::Raw };
    let result = linker::link(&[a, b], &opts).unwrap();
    // main is 3 bytes, lib is 1 byte; first-fit places the bigger
    // section (main) first in the single free region starting at 0x20.
    let lib_start = result.image[0x21]; // byte 1 of main == lib's resolved address
    assert_eq!(lib_start, 0x23);
}

#[test]
fn scenario_4_macro_expansion_and_line_numbering() {
    let object = assemble_ok("macro dup/1\ndc $1,$1\nmend\nasect 0x00\ndup 5\nend\n");
    assert!(object.contains("ABS 00: 05 05"));
}

#[test]
fn scenario_5_unique_directive_avoids_name_capture() {
    let object = assemble_ok(
        "macro alloc/0\nunique a,b,r0\nmove !a, r1\nmove !b, r1\nmend\nasect 0x00\nalloc\nend\n",
    );
    // r0 reserved, a and b get two of {r1,r2,r3} and must differ.
    assert!(object.contains("ABS"));
}

#[test]
fn scenario_5b_unique_rejects_more_than_four_operands() {
    let err = assembler::assemble(
        "macro toomany/0\nunique a,b,c,d,e\nmend\nasect 0x00\ntoomany\nend\n",
        &[],
        false,
        false,
    )
    .unwrap_err();
    assert!(err.to_string().contains("More than 4 operands"));
}

#[test]
fn scenario_6_missing_end_is_a_fatal_error() {
    let err = assembler::assemble("asect 0x10\ndc 1\n", &[], false, false).unwrap_err();
    assert!(err.to_string().contains("end of program"));
}

#[test]
fn macro_expansion_limit_is_enforced() {
    let mut source = String::from("macro loop1/0\nloop1\nmend\nasect 0x00\nloop1\nend\n");
    // loop1 invokes itself, so expansion runs away past the 800 cap.
    let err = assembler::assemble(&mut source, &[], false, false).unwrap_err();
    assert!(err.to_string().contains("800"));
}

#[test]
fn symbol_enhanced_image_lists_resolved_entries() {
    let object = assemble_ok("rsect main\nstart> ldi r0, 7\nhalt\nend\n");
    let opts = LinkOptions { mode: Mode::Relative, low_bound: 0x20, format: ImageFormat::Symbol };
    let result = linker::link(&[object], &opts).unwrap();
    assert_eq!(result.entry_addresses.get("start"), Some(&0x20));

    let symbols: Vec<(String, u8)> = result.entry_addresses.iter().map(|(n, a)| (n.clone(), *a as u8)).collect();
    let rendered = linker::image::render_symbol(&result.image, &symbols);
    assert!(rendered.contains("start:20"));
}

#[test]
fn two_relocatables_may_only_subtract() {
    let err = assembler::assemble(
        "rsect main\na: dc 1\nb: dc 2\nc: dc a+b\nend\n",
        &[],
        false,
        false,
    )
    .unwrap_err();
    assert!(err.to_string().contains("subtracted"));
}
