//! Minimal runner: load a flat ROM image and enter the emulation loop.
//!
//! Bring-up and debugging aid; the real emulator embeds `powermac-core`
//! and provides its own devices.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use powermac_core::lowmem::ROM_BASE;
use powermac_core::{EngineError, Machine, MachineConfig, NullServices};

#[derive(Parser)]
#[command(name = "powermac", about = "Run a PowerPC ROM image headless")]
struct Args {
    /// ROM image file.
    #[arg(long)]
    rom: PathBuf,
    /// Machine configuration (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Entry PC; defaults to the ROM base.
    #[arg(long, value_parser = parse_addr)]
    entry: Option<u32>,
}

fn parse_addr(text: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|err| format!("bad address {text:?}: {err}"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    eprintln!("cannot read {}: {err}", path.display());
                    return ExitCode::FAILURE;
                }
            };
            match MachineConfig::from_json(&text) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("bad config {}: {err}", path.display());
                    return ExitCode::FAILURE;
                }
            }
        }
        None => MachineConfig::default(),
    };

    let image = match fs::read(&args.rom) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("cannot read {}: {err}", args.rom.display());
            return ExitCode::FAILURE;
        }
    };

    let mut machine = match Machine::new(config) {
        Ok(machine) => machine,
        Err(err) => {
            eprintln!("machine setup failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    machine.load_rom(&image);

    let mut host = NullServices;
    let entry = args.entry.unwrap_or(ROM_BASE);
    match machine.run(&mut host, entry) {
        Ok(()) | Err(EngineError::Quit) => {
            machine.print_stats();
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("emulation failed: {err}");
            ExitCode::FAILURE
        }
    }
}
