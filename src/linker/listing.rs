//! Link-summary listing: per-section placement, entry addresses, and
//! the resolved address of every external.

use crate::linker::object::ParsedObject;
use std::collections::HashMap;
use std::fmt::Write as _;

pub fn format_link_listing(
    obj: &ParsedObject,
    placed: &HashMap<String, u32>,
    entry_addresses: &HashMap<String, u32>,
) -> String {
    let mut out = String::new();
    writeln!(out, "-- placement --").unwrap();
    let mut names: Vec<_> = placed.keys().cloned().collect();
    names.sort();
    for name in &names {
        let size = obj.sections.get(name).map(|s| s.data.len()).unwrap_or(0);
        writeln!(out, "{}: {:02x}..{:02x}", name, placed[name], placed[name] as usize + size).unwrap();
    }

    writeln!(out, "-- entries --").unwrap();
    let mut entry_names: Vec<_> = entry_addresses.keys().cloned().collect();
    entry_names.sort();
    for name in entry_names {
        writeln!(out, "{} = {:02x}", name, entry_addresses[&name]).unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::object::ParsedObject;

    #[test]
    fn lists_placement_and_entries() {
        let obj = ParsedObject::default();
        let mut placed = HashMap::new();
        placed.insert("main".to_string(), 0x20u32);
        let mut entries = HashMap::new();
        entries.insert("start".to_string(), 0x20u32);
        let listing = format_link_listing(&obj, &placed, &entries);
        assert!(listing.contains("main: 20..20"));
        assert!(listing.contains("start = 20"));
    }
}
