//! Parses the bespoke object-file text (§6.1) into structured input for
//! the placement algorithm. Grounded in `cocol.py`'s `link()` parsing
//! loop.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AbsSegment {
    pub start: u32,
    pub bytes: Vec<u8>,
    pub file: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSection {
    pub file: usize,
    pub data: Vec<u8>,
    pub rel: Vec<u32>,
    pub ents: HashMap<String, u32>,
    pub start: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedObject {
    pub abs_segments: Vec<AbsSegment>,
    pub abs_entries: HashMap<String, u32>,
    pub sections: HashMap<String, ParsedSection>,
    /// Insertion order of sections, preserved for deterministic output.
    pub section_order: Vec<String>,
    pub externs: HashMap<String, Vec<(String, u32)>>,
}

fn parse_hex_byte(s: &str) -> Result<u8, String> {
    u8::from_str_radix(s, 16).map_err(|_| format!("Illegal hex byte '{}'", s))
}

/// Parse one object file's text, tagging every absolute segment and
/// section with `file` (its index among all inputs given to the
/// linker, used for per-file clash/placement diagnostics).
pub fn parse_object(text: &str, file: usize) -> Result<ParsedObject, String> {
    let mut obj = ParsedObject::default();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("ABS ") {
            let (addr_part, bytes_part) = rest.split_once(':').ok_or("Malformed ABS line")?;
            let start = u32::from_str_radix(addr_part.trim(), 16).map_err(|_| "Malformed ABS address")?;
            let bytes: Vec<u8> = bytes_part.split_whitespace().map(parse_hex_byte).collect::<Result<_, _>>()?;
            obj.abs_segments.push(AbsSegment { start, bytes, file });
        } else if let Some(rest) = line.strip_prefix("NAME ") {
            let name = rest.trim().to_string();
            obj.sections.entry(name.clone()).or_insert_with(|| ParsedSection { file, ..Default::default() });
            obj.section_order.push(name.clone());
            current = Some(name);
        } else if let Some(rest) = line.strip_prefix("DATA ") {
            let name = current.clone().ok_or("DATA outside a section")?;
            let data: Vec<u8> = rest.split_whitespace().map(parse_hex_byte).collect::<Result<_, _>>()?;
            obj.sections.get_mut(&name).unwrap().data = data;
        } else if let Some(rest) = line.strip_prefix("REL ") {
            let name = current.clone().ok_or("REL outside a section")?;
            let rel: Vec<u32> = rest
                .split_whitespace()
                .map(|h| u32::from_str_radix(h, 16).map_err(|_| "Malformed REL offset".to_string()))
                .collect::<Result<_, _>>()?;
            obj.sections.get_mut(&name).unwrap().rel = rel;
        } else if let Some(rest) = line.strip_prefix("NTRY ") {
            let mut parts = rest.split_whitespace();
            let name = parts.next().ok_or("Malformed NTRY line")?.to_string();
            let offset = u32::from_str_radix(parts.next().ok_or("Malformed NTRY line")?, 16).map_err(|_| "Malformed NTRY offset")?;
            match &current {
                Some(sect) => {
                    obj.sections.get_mut(sect).unwrap().ents.insert(name, offset);
                }
                None => {
                    obj.abs_entries.insert(name, offset);
                }
            }
        } else if let Some(rest) = line.strip_prefix("XTRN ") {
            let (name, sites_part) = rest.split_once(':').ok_or("Malformed XTRN line")?;
            let name = name.trim().to_string();
            let mut sites = Vec::new();
            let tokens: Vec<&str> = sites_part.split_whitespace().collect();
            for pair in tokens.chunks(2) {
                if let [sect, off] = pair {
                    let offset = u32::from_str_radix(off, 16).map_err(|_| "Malformed XTRN offset")?;
                    sites.push((sect.to_string(), offset));
                }
            }
            obj.externs.entry(name).or_default().extend(sites);
        } else {
            return Err(format!("Unrecognized object file line: {}", line));
        }
    }

    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_abs_segment() {
        let obj = parse_object("ABS 10: 01 02 03\n", 0).unwrap();
        assert_eq!(obj.abs_segments.len(), 1);
        assert_eq!(obj.abs_segments[0].start, 0x10);
        assert_eq!(obj.abs_segments[0].bytes, vec![1, 2, 3]);
    }

    #[test]
    fn parses_named_section_with_rel_and_entry() {
        let obj = parse_object("NAME main\nDATA d0 07 d4\nREL 01\nNTRY start 00\n", 0).unwrap();
        let sect = &obj.sections["main"];
        assert_eq!(sect.data, vec![0xd0, 0x07, 0xd4]);
        assert_eq!(sect.rel, vec![1]);
        assert_eq!(sect.ents["start"], 0);
    }

    #[test]
    fn parses_xtrn_with_multiple_sites() {
        let obj = parse_object("XTRN x: main 01 lib 03\n", 0).unwrap();
        assert_eq!(obj.externs["x"], vec![("main".to_string(), 1), ("lib".to_string(), 3)]);
    }
}
