//! A toolchain for the CdM-8 educational 8-bit processor, featuring:
//! - a two-pass assembler with a textual macro processor
//! - a linker that places relocatable sections into a 256-byte image

pub mod assembler;
pub mod linker;
pub mod logging;
