//! Final 256-byte image rendering in the three formats from `spec.md`
//! §6.2: raw, symbol-enhanced, and XOR-encrypted.
//!
//! The original encryption keys its XOR stream off CPython's `random`
//! module, which has no meaningful Rust equivalent to reproduce
//! byte-for-byte. This crate uses a small deterministic xorshift32
//! generator seeded the same way instead — see `DESIGN.md`.

use std::fmt::Write as _;

fn hex_byte(b: u8) -> String {
    format!("{:02x}", b)
}

/// `v2.0 raw` — one byte per line.
pub fn render_raw(img: &[u8; 256]) -> String {
    let mut out = String::new();
    writeln!(out, "v2.0 raw").unwrap();
    for b in img {
        writeln!(out, "{}", hex_byte(*b)).unwrap();
    }
    out
}

/// `v1.0 sym` — one colon-joined line, then `name:hh` symbol lines.
pub fn render_symbol(img: &[u8; 256], symbols: &[(String, u8)]) -> String {
    let mut out = String::new();
    writeln!(out, "v1.0 sym").unwrap();
    let joined: Vec<String> = img.iter().map(|b| hex_byte(*b)).collect();
    writeln!(out, "{}", joined.join(":")).unwrap();
    for (name, offset) in symbols {
        writeln!(out, "{}:{}", name, hex_byte(*offset)).unwrap();
    }
    out
}

/// A small, fast, deterministic PRNG — not cryptographically secure,
/// and not a port of CPython's Mersenne Twister. Used only to derive a
/// reproducible XOR keystream for the encrypted image variant.
struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    fn new(seed: u32) -> XorShift32 {
        XorShift32 { state: if seed == 0 { 0x9E3779B9 } else { seed } }
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    fn next_byte(&mut self) -> u8 {
        (self.next_u32() & 0xFF) as u8
    }
}

/// `v2.0 crypt<12-digit-seed>` — each image byte XOR-masked by the
/// keystream seeded from the 12-digit decimal header.
pub fn render_encrypted(img: &[u8; 256], seed: u32) -> String {
    let mut out = String::new();
    writeln!(out, "v2.0 crypt{:012}", seed).unwrap();
    let mut rng = XorShift32::new(seed);
    for b in img {
        writeln!(out, "{}", hex_byte(b ^ rng.next_byte())).unwrap();
    }
    out
}

/// Reverse [render_encrypted] — this crate's own round-trip check; the
/// format has no other consumer to stay compatible with.
pub fn decrypt(text: &str) -> Result<[u8; 256], String> {
    let mut lines = text.lines();
    let header = lines.next().ok_or("Empty image file")?;
    let seed_str = header.strip_prefix("v2.0 crypt").ok_or("Not an encrypted image")?;
    let seed: u32 = seed_str.parse().map_err(|_| "Malformed seed header")?;
    let mut rng = XorShift32::new(seed);
    let mut img = [0u8; 256];
    for (i, line) in lines.enumerate() {
        if i >= 256 {
            break;
        }
        let b = u8::from_str_radix(line.trim(), 16).map_err(|_| "Malformed image byte")?;
        img[i] = b ^ rng.next_byte();
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_image_has_256_byte_lines() {
        let img = [0u8; 256];
        let text = render_raw(&img);
        assert_eq!(text.lines().count(), 257);
        assert_eq!(text.lines().next(), Some("v2.0 raw"));
    }

    #[test]
    fn symbol_image_includes_symbol_lines() {
        let mut img = [0u8; 256];
        img[0x20] = 0xD0;
        let text = render_symbol(&img, &[("start".to_string(), 0x20)]);
        assert!(text.contains("start:20"));
    }

    #[test]
    fn encrypted_image_round_trips() {
        let mut img = [0u8; 256];
        for (i, b) in img.iter_mut().enumerate() {
            *b = i as u8;
        }
        let text = render_encrypted(&img, 424242);
        let back = decrypt(&text).unwrap();
        assert_eq!(back, img);
    }
}
