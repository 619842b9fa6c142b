//! A two-pass assembler for the CdM-8 educational 8-bit processor.
//!
//! Source text goes in; an object file text, a listing, and a
//! diagnostic on failure come out. See the submodules for the pipeline
//! stages: [token] lexes, [expr] evaluates operand expressions,
//! [statement] dispatches one line to [instructions] or [directives],
//! [macros] expands user-defined opcodes, [driver] runs the two passes,
//! and [emitter]/[listing] render the results.

pub mod context;
pub mod directives;
pub mod driver;
pub mod emitter;
pub mod error;
pub mod expr;
pub mod instructions;
pub mod listing;
pub mod macros;
pub mod node;
pub mod statement;
pub mod token;

pub use context::Context;
pub use error::Error;

/// The result of a successful assembly: the object file text and the
/// human-readable listing.
pub struct Assembled {
    pub object: String,
    pub listing: String,
}

/// Assemble one source file (plus optional macro library texts) into
/// an object file and a listing.
///
/// `v3` selects Mark-3 compatibility mode (rejects `ldsa`/`addsp`/
/// `setsp`/`pushall`/`popall`); `show_expansions` corresponds to the
/// CLI's `-lx` flag.
pub fn assemble(source: &str, libraries: &[String], v3: bool, show_expansions: bool) -> Result<Assembled, Error> {
    let mut ctx = Context::new(v3);
    ctx.lst_me = show_expansions;
    for lib in libraries {
        macros::load_library(&mut ctx, lib);
    }
    ctx.text = source.lines().map(|s| s.to_string()).collect();
    ctx.generated = vec![false; ctx.text.len()];

    let emissions = driver::run(&mut ctx)?;
    let object = emitter::emit_object(&ctx, &emissions);
    let listing = listing::format_listing(&ctx, &emissions, ctx.lst_me);
    Ok(Assembled { object, listing })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_a_minimal_program() {
        let source = "asect 0x10\nfoo: dc 1,2,3\nend\n";
        let result = assemble(source, &[], false, false).unwrap();
        assert!(result.object.contains("ABS 10: 01 02 03"));
    }

    #[test]
    fn reports_a_structured_error_without_end() {
        let source = "asect 0x10\ndc 1\n";
        let err = assemble(source, &[], false, false).unwrap_err();
        assert!(err.to_string().contains("end of program"));
    }
}
