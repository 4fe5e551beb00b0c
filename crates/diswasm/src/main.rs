use anyhow::{Context, Result};
use clap::Parser;
use diswasm::{decompile, DecompileOptions};
use std::fs;
use std::path::PathBuf;

/// diswasm — WebAssembly decompiler emitting C-like pseudocode.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input WebAssembly binary (.wasm)
    input: PathBuf,

    /// Output pseudocode file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Only emit functions stored in the function table
    #[arg(long)]
    gadgets: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    eprintln!("diswasm: decompiling {}", cli.input.display());

    let wasm_bytes =
        fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;

    let options = DecompileOptions {
        gadgets: cli.gadgets,
    };

    let text = decompile(&wasm_bytes, &options).context("decompilation failed")?;

    if let Some(output_path) = cli.output {
        fs::write(&output_path, &text)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        eprintln!("diswasm: wrote {}", output_path.display());
    } else {
        print!("{}", text);
    }

    eprintln!("diswasm: decompilation complete");
    Ok(())
}
