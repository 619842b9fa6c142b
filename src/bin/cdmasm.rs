//! The `cdmasm` CLI: assembles one source file into an object file
//! (and optionally a listing).

use cdm8asm::assembler;
use cdm8asm::logging;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

struct Args {
    source: PathBuf,
    listing: bool,
    listing_expansions: bool,
    libraries: Vec<PathBuf>,
    debug: bool,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut source = None;
    let mut listing = false;
    let mut listing_expansions = false;
    let mut libraries = Vec::new();
    let mut debug = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-l" => listing = true,
            "-lx" => {
                listing = true;
                listing_expansions = true;
            }
            "-d" => debug = true,
            "-m" => {
                i += 1;
                while i < args.len() && !args[i].starts_with('-') {
                    libraries.push(PathBuf::from(&args[i]));
                    i += 1;
                }
                continue;
            }
            other if !other.starts_with('-') => {
                if source.is_some() {
                    return Err(format!("unexpected extra argument '{}'", other));
                }
                source = Some(PathBuf::from(other));
            }
            other => return Err(format!("unknown flag '{}'", other)),
        }
        i += 1;
    }

    let source = source.ok_or("usage: cdmasm <source.asm> [-l|-lx] [-m lib...] [-d]")?;
    Ok(Args { source, listing, listing_expansions, libraries, debug })
}

/// The `.asm` extension on the source filename is optional; strip it if
/// present and unconditionally re-append it, matching a bare stem being
/// treated as `stem.asm`.
fn resolve_asm_path(path: &Path) -> PathBuf {
    let stem = match path.to_str() {
        Some(s) => s.strip_suffix(".asm").unwrap_or(s),
        None => return path.to_path_buf(),
    };
    PathBuf::from(format!("{}.asm", stem))
}

fn find_standard_library() -> Option<PathBuf> {
    let beside_exe = env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("standard.mlb")));
    if let Some(p) = &beside_exe {
        if p.exists() {
            return beside_exe;
        }
    }
    let cwd = Path::new("standard.mlb");
    if cwd.exists() {
        return Some(cwd.to_path_buf());
    }
    None
}

fn main() -> ExitCode {
    let raw_args: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&raw_args) {
        Ok(args) => args,
        Err(message) => {
            logging::error(message);
            return ExitCode::from(1);
        }
    };

    let source_path = resolve_asm_path(&args.source);
    let source = match fs::read_to_string(&source_path) {
        Ok(s) => s,
        Err(e) => {
            logging::error(format!("cannot read {}: {}", source_path.display(), e));
            return ExitCode::from(1);
        }
    };

    let mut libraries = Vec::new();
    match find_standard_library() {
        Some(path) => match fs::read_to_string(&path) {
            Ok(text) => libraries.push(text),
            Err(e) => logging::warning(format!("cannot read {}: {}", path.display(), e), 0),
        },
        None => logging::warning("standard.mlb not found".to_string(), 0),
    }
    for path in &args.libraries {
        match fs::read_to_string(path) {
            Ok(text) => libraries.push(text),
            Err(e) => logging::warning(format!("cannot read {}: {}", path.display(), e), 0),
        }
    }

    if args.debug {
        logging::note(format!("assembling {}", args.source.display()));
    }

    let assembled = match assembler::assemble(&source, &libraries, false, args.listing_expansions) {
        Ok(a) => a,
        Err(e) => {
            logging::error(e.to_string());
            return ExitCode::from(2);
        }
    };

    let object_path = source_path.with_extension("obj");
    if let Err(e) = fs::write(&object_path, &assembled.object) {
        logging::error(format!("cannot write {}: {}", object_path.display(), e));
        return ExitCode::from(3);
    }

    if args.listing {
        let listing_path = source_path.with_extension("lst");
        if let Err(e) = fs::write(&listing_path, &assembled.listing) {
            logging::error(format!("cannot write {}: {}", listing_path.display(), e));
            return ExitCode::from(3);
        }
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_stem_gets_asm_appended() {
        assert_eq!(resolve_asm_path(Path::new("foo")), PathBuf::from("foo.asm"));
    }

    #[test]
    fn explicit_asm_extension_is_kept_as_is() {
        assert_eq!(resolve_asm_path(Path::new("foo.asm")), PathBuf::from("foo.asm"));
    }

    #[test]
    fn directory_components_are_preserved() {
        assert_eq!(resolve_asm_path(Path::new("dir/foo")), PathBuf::from("dir/foo.asm"));
    }
}
