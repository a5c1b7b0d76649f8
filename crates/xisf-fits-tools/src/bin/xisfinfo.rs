use std::path::PathBuf;
use std::process;

use clap::Parser;
use xisf_fits_tools::{format_metadata, init_logging};

#[derive(Parser)]
#[command(name = "xisfinfo")]
#[command(about = "Describe the images stored in XISF files")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// XISF files to describe
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut failed = false;
    for (i, path) in cli.files.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Error reading {}: {}", path.display(), e);
                failed = true;
                continue;
            }
        };
        match xisf_fits::inspect(&bytes) {
            Ok(metadata) => {
                println!("File: {}", path.display());
                print!("{}", format_metadata(&metadata));
            }
            Err(e) => {
                eprintln!("Error parsing {}: {}", path.display(), e);
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}
