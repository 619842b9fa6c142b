//! Listing formatter: interleaves source lines with addresses and the
//! bytes each line emitted. See `spec.md` §4.7.

use crate::assembler::context::Context;
use crate::assembler::driver::Emission;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Render the full listing for one compiled file.
///
/// Lines generated by macro expansion are folded under their invocation
/// line unless `show_expansions` (the `-lx` flag / `lst_me`) is set.
pub fn format_listing(ctx: &Context, emissions: &[Emission], show_expansions: bool) -> String {
    let mut by_line: HashMap<usize, Vec<&Emission>> = HashMap::new();
    for e in emissions {
        by_line.entry(e.line).or_default().push(e);
    }

    let mut out = String::new();
    let mut visible_line = 0usize;
    for (i, source) in ctx.text.iter().enumerate() {
        let generated = ctx.generated.get(i).copied().unwrap_or(false);
        if generated && !show_expansions {
            continue;
        }
        if !generated {
            visible_line += 1;
        }
        let line_no = visible_line;
        let group: &[&Emission] = by_line.get(&line_no).map(Vec::as_slice).unwrap_or(&[]);

        if group.is_empty() {
            writeln!(out, "{:>8}  {:>3}  {}", "", "", source).unwrap();
            continue;
        }

        // A macro invocation folds its generated lines' bytes into the
        // invocation row; if those bytes aren't one contiguous run in
        // the same section, there's no single address to print.
        if !show_expansions && !group_is_contiguous(group) {
            writeln!(out, "{:<8}  {:>3}  {}", "<scattered>", line_no, source).unwrap();
            continue;
        }

        let bytes: Vec<u8> = group.iter().flat_map(|e| e.bytes.iter().copied()).collect();
        let addr = group[0].address;
        let mut chunks = bytes.chunks(4);
        let first = chunks.next().unwrap_or(&[]);
        let bytes_str: String = first.iter().map(|b| format!("{:02x} ", b)).collect();
        writeln!(out, "{:02x}: {:<12}{:>3}  {}", addr, bytes_str.trim_end(), line_no, source).unwrap();
        for chunk in chunks {
            let s: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
            writeln!(out, "    {:<12}", s.trim_end()).unwrap();
        }
    }

    write_summary(&mut out, ctx, emissions);
    out
}

/// Are this invocation line's folded emissions one unbroken run of bytes
/// in a single section, in address order?
fn group_is_contiguous(group: &[&Emission]) -> bool {
    group.windows(2).all(|pair| {
        let (a, b) = (pair[0], pair[1]);
        b.address == a.address + a.bytes.len() as u32 && b.section == a.section
    })
}

fn write_summary(out: &mut String, ctx: &Context, emissions: &[Emission]) {
    writeln!(out).unwrap();
    writeln!(out, "-- sections --").unwrap();
    let mut sizes: HashMap<&str, u32> = HashMap::new();
    for e in emissions {
        *sizes.entry(e.section.as_str()).or_insert(0) += e.bytes.len() as u32;
    }
    let mut names: Vec<_> = sizes.keys().copied().collect();
    names.sort();
    for name in names {
        writeln!(out, "{}: {} bytes", name, sizes[name]).unwrap();
    }

    writeln!(out, "-- entries --").unwrap();
    let mut sections: Vec<_> = ctx.ents.keys().cloned().collect();
    sections.sort();
    for section in sections {
        let mut entries: Vec<_> = ctx.ents[&section].iter().collect();
        entries.sort();
        for (name, offset) in entries {
            writeln!(out, "{}.{} = {:02x}", section, name, offset).unwrap();
        }
    }

    if !ctx.exts.is_empty() {
        writeln!(out, "-- externals --").unwrap();
        let mut names: Vec<_> = ctx.exts.keys().cloned().collect();
        names.sort();
        for name in names {
            let sites = &ctx.exts[&name];
            if sites.is_empty() {
                writeln!(out, "{}: declared but unused", name).unwrap();
            } else {
                for (sect, off) in sites {
                    writeln!(out, "{}: used at {}.{:02x}", name, sect, off).unwrap();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::context::Context;

    #[test]
    fn listing_shows_address_and_bytes() {
        let mut ctx = Context::new(false);
        ctx.text = vec!["asect 0x10".to_string(), "foo: dc 1,2,3".to_string(), "end".to_string()];
        ctx.generated = vec![false; 3];
        let emissions = vec![Emission { line: 2, address: 0x10, bytes: vec![1, 2, 3], section: "$abs".to_string() }];
        let listing = format_listing(&ctx, &emissions, false);
        assert!(listing.contains("10:"));
        assert!(listing.contains("foo: dc 1,2,3"));
    }

    #[test]
    fn macro_expansions_are_folded_by_default() {
        let mut ctx = Context::new(false);
        ctx.text = vec!["dup 5".to_string(), "dc 0x05,0x05 #\u{1}".to_string()];
        ctx.generated = vec![false, true];
        let emissions = vec![Emission { line: 1, address: 0, bytes: vec![5, 5], section: "$abs".to_string() }];
        let listing = format_listing(&ctx, &emissions, false);
        assert!(!listing.contains("0x05,0x05"));
        let listing_expanded = format_listing(&ctx, &emissions, true);
        assert!(listing_expanded.contains("0x05,0x05"));
    }

    #[test]
    fn noncontiguous_folded_bytes_are_marked_scattered() {
        let mut ctx = Context::new(false);
        ctx.text = vec!["spread".to_string(), "dc 1 #\u{1}".to_string(), "dc 2 #\u{1}".to_string()];
        ctx.generated = vec![false, true, true];
        let emissions = vec![
            Emission { line: 1, address: 0x10, bytes: vec![1], section: "$abs".to_string() },
            // Jumps to a different address: not one contiguous run.
            Emission { line: 1, address: 0x20, bytes: vec![2], section: "$abs".to_string() },
        ];
        let listing = format_listing(&ctx, &emissions, false);
        assert!(listing.contains("<scattered>"));
        assert!(listing.contains("spread"));
    }
}
