//! Serializes a finished [Context] + emission list into the bespoke
//! object-file text described in `spec.md` §4.6 / §6.1.
//!
//! Grounded in `cocas.py`'s `genoc`, including its adjacent-`ABS`-segment
//! coalescing (done iteratively here, not recursively).

use crate::assembler::context::Context;
use crate::assembler::driver::Emission;
use std::collections::BTreeMap;
use std::fmt::Write as _;

fn hex_byte(b: u8) -> String {
    format!("{:02x}", b)
}

/// Merge adjacent/overlapping absolute byte runs into the fewest
/// contiguous `(start, bytes)` segments, sorted by address.
fn coalesce_abs(mut bytes: BTreeMap<u32, u8>) -> Vec<(u32, Vec<u8>)> {
    let mut segments = Vec::new();
    while let Some((&start, _)) = bytes.iter().next() {
        let mut addr = start;
        let mut run = Vec::new();
        while let Some(b) = bytes.remove(&addr) {
            run.push(b);
            addr += 1;
        }
        segments.push((start, run));
    }
    segments
}

/// Serialize the object file text for one compiled section set.
pub fn emit_object(ctx: &Context, emissions: &[Emission]) -> String {
    let mut out = String::new();

    let mut abs_bytes: BTreeMap<u32, u8> = BTreeMap::new();
    let mut by_section: BTreeMap<String, BTreeMap<u32, u8>> = BTreeMap::new();
    for e in emissions {
        if e.section == "$abs" {
            for (k, b) in e.bytes.iter().enumerate() {
                abs_bytes.insert(e.address + k as u32, *b);
            }
        } else {
            let map = by_section.entry(e.section.clone()).or_default();
            for (k, b) in e.bytes.iter().enumerate() {
                map.insert(e.address + k as u32, *b);
            }
        }
    }

    for (start, run) in coalesce_abs(abs_bytes) {
        let bytes_str: Vec<String> = run.iter().map(|b| hex_byte(*b)).collect();
        writeln!(out, "ABS {}: {}", hex_byte((start % 256) as u8), bytes_str.join(" ")).unwrap();
    }

    if let Some(abs_ents) = ctx.ents.get("$abs") {
        let mut names: Vec<_> = abs_ents.iter().collect();
        names.sort();
        for (name, offset) in names {
            writeln!(out, "NTRY {} {}", name, hex_byte((*offset % 256) as u8)).unwrap();
        }
    }

    for (name, offsets) in &by_section {
        let size = offsets.keys().max().map(|m| m + 1).unwrap_or(0);
        let data: Vec<u8> = (0..size).map(|i| *offsets.get(&i).unwrap_or(&0)).collect();
        writeln!(out, "NAME {}", name).unwrap();
        writeln!(out, "DATA {}", data.iter().map(|b| hex_byte(*b)).collect::<Vec<_>>().join(" ")).unwrap();
        let rel = ctx.rel_list.get(name).cloned().unwrap_or_default();
        let rel_str: Vec<String> = rel.iter().map(|o| hex_byte((*o % 256) as u8)).collect();
        writeln!(out, "REL {}", rel_str.join(" ")).unwrap();
        if let Some(ents) = ctx.ents.get(name) {
            let mut names: Vec<_> = ents.iter().collect();
            names.sort();
            for (ename, offset) in names {
                writeln!(out, "NTRY {} {}", ename, hex_byte((*offset % 256) as u8)).unwrap();
            }
        }
    }

    let mut ext_names: Vec<_> = ctx.exts.iter().collect();
    ext_names.sort_by(|a, b| a.0.cmp(b.0));
    for (name, sites) in ext_names {
        let sites_str: Vec<String> = sites.iter().map(|(sect, off)| format!("{} {}", sect, hex_byte((*off % 256) as u8))).collect();
        writeln!(out, "XTRN {}: {}", name, sites_str.join(" ")).unwrap();
    }

    out
}
