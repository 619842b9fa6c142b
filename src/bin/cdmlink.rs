//! The `cdmlink` CLI: links one or more object files into a 256-byte
//! image.

use cdm8asm::linker::{self, ImageFormat, LinkOptions, Mode};
use cdm8asm::logging;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

struct Args {
    objects: Vec<PathBuf>,
    listing: bool,
    mode: Mode,
    low_bound: u32,
    symbol_enhanced: bool,
    encrypt: bool,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut objects = Vec::new();
    let mut listing = false;
    let mut mode = Mode::Relative;
    let mut low_bound = 0x20;
    let mut symbol_enhanced = false;
    let mut encrypt = false;

    for arg in args {
        match arg.as_str() {
            "-l" => listing = true,
            "-a" => mode = Mode::Absolute,
            "-r" => mode = Mode::Relative,
            "-z" => low_bound = 0,
            "-s" => symbol_enhanced = true,
            "-y" => encrypt = true,
            other if !other.starts_with('-') => objects.push(PathBuf::from(other)),
            other => return Err(format!("unknown flag '{}'", other)),
        }
    }

    if objects.is_empty() {
        return Err("usage: cdmlink <object...> [-l] [-a|-r] [-z] [-s] [-y]".to_string());
    }
    Ok(Args { objects, listing, mode, low_bound, symbol_enhanced, encrypt })
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

    let mut texts = Vec::new();
    for path in &args.objects {
        match fs::read_to_string(path) {
            Ok(text) => texts.push(text),
            Err(e) => {
                logging::error(format!("cannot read {}: {}", path.display(), e));
                return ExitCode::from(1);
            }
        }
    }

    let format = if args.encrypt {
        ImageFormat::Encrypted { seed: 0x1234_5678 }
    } else if args.symbol_enhanced {
        ImageFormat::Symbol
    } else {
        ImageFormat::Raw
    };

    let opts = LinkOptions { mode: args.mode, low_bound: args.low_bound, format };
    let result = match linker::link(&texts, &opts) {
        Ok(r) => r,
        Err(e) => {
            logging::error(e.to_string());
            return ExitCode::from(2);
        }
    };

    let image_text = match format {
        ImageFormat::Raw => linker::image::render_raw(&result.image),
        ImageFormat::Symbol => {
            let mut symbols: Vec<(String, u8)> =
                result.entry_addresses.iter().map(|(name, addr)| (name.clone(), (*addr % 256) as u8)).collect();
            symbols.sort();
            linker::image::render_symbol(&result.image, &symbols)
        }
        ImageFormat::Encrypted { seed } => linker::image::render_encrypted(&result.image, seed),
    };

    if let Err(e) = fs::write("a.img", &image_text) {
        logging::error(format!("cannot write a.img: {}", e));
        return ExitCode::from(2);
    }

    if args.listing {
        logging::note(result.listing);
    }

    ExitCode::SUCCESS
}
