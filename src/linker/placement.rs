//! First-fit placement of relocatable sections into the free regions
//! around absolute segments, and the `main`-rooted reachability
//! closure used in "relative" mode.
//!
//! Grounded in `cocol.py`'s `deploy`/`link` free-region and placement
//! logic; see `spec.md` §4.8.

use crate::linker::object::ParsedObject;
use std::collections::{HashMap, HashSet, VecDeque};

/// Free byte ranges as `(start, length)`, computed as the complement of
/// `taken` within `[low_bound, 256)`.
pub fn free_regions(taken: &[(u32, u32)], low_bound: u32) -> Vec<(u32, u32)> {
    let mut occupied: Vec<bool> = vec![false; 256];
    for &(start, len) in taken {
        for a in start..start + len {
            if (a as usize) < 256 {
                occupied[a as usize] = true;
            }
        }
    }
    let mut regions = Vec::new();
    let mut i = low_bound as usize;
    while i < 256 {
        if occupied[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < 256 && !occupied[i] {
            i += 1;
        }
        regions.push((start as u32, (i - start) as u32));
    }
    regions
}

/// First-fit: sections sorted by size descending, free regions sorted
/// by size ascending, pick the smallest region a section fits in.
pub fn first_fit(sections: &[(String, u32)], free: &[(u32, u32)]) -> Result<HashMap<String, u32>, String> {
    let mut ordered: Vec<(String, u32)> = sections.to_vec();
    ordered.sort_by(|a, b| b.1.cmp(&a.1));

    let mut regions: Vec<(u32, u32)> = free.to_vec();
    regions.sort_by_key(|r| r.1);

    let mut placed = HashMap::new();
    for (name, size) in ordered {
        let idx = regions
            .iter()
            .position(|&(_, len)| len >= size)
            .ok_or_else(|| format!("Section {} (size {}) does not fit in any free region", name, size))?;
        let (start, len) = regions[idx];
        placed.insert(name, start);
        if len == size {
            regions.remove(idx);
        } else {
            regions[idx] = (start + size, len - size);
            regions.sort_by_key(|r| r.1);
        }
    }
    Ok(placed)
}

/// Compute the set of section names reachable from `main` via the
/// ext-reference → entry-owning-section relation.
pub fn reachable_from_main(obj: &ParsedObject) -> HashSet<String> {
    let mut entry_owner: HashMap<&str, &str> = HashMap::new();
    for (name, section) in &obj.sections {
        for ent_name in section.ents.keys() {
            entry_owner.insert(ent_name, name);
        }
    }

    let mut uses_by_section: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, sites) in &obj.externs {
        for (sect, _) in sites {
            uses_by_section.entry(sect.as_str()).or_default().push(name);
        }
    }

    let mut closure = HashSet::new();
    let mut queue = VecDeque::new();
    if obj.sections.contains_key("main") {
        closure.insert("main".to_string());
        queue.push_back("main");
    }
    while let Some(current) = queue.pop_front() {
        if let Some(used) = uses_by_section.get(current) {
            for name in used {
                if let Some(owner) = entry_owner.get(name) {
                    if closure.insert(owner.to_string()) {
                        queue.push_back(owner);
                    }
                }
            }
        }
    }
    closure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_regions_around_a_taken_block() {
        let regions = free_regions(&[(0x10, 4)], 0);
        assert_eq!(regions, vec![(0, 0x10), (0x14, 256 - 0x14)]);
    }

    #[test]
    fn low_bound_excludes_the_start() {
        let regions = free_regions(&[], 0x20);
        assert_eq!(regions, vec![(0x20, 256 - 0x20)]);
    }

    #[test]
    fn first_fit_picks_smallest_containing_region() {
        let sections = vec![("a".to_string(), 3u32)];
        let free = vec![(0x00, 2), (0x20, 10), (0x40, 4)];
        let placed = first_fit(&sections, &free).unwrap();
        assert_eq!(placed["a"], 0x40);
    }

    #[test]
    fn first_fit_fails_when_nothing_fits() {
        let sections = vec![("a".to_string(), 300u32)];
        let free = vec![(0x20, 10)];
        assert!(first_fit(&sections, &free).is_err());
    }
}
