use std::path::PathBuf;
use std::process;

use clap::Parser;
use rayon::prelude::*;
use xisf_fits::ConvertOptions;
use xisf_fits_tools::{convert_path, init_logging, Selection};

#[derive(Parser)]
#[command(name = "xisf2fits")]
#[command(about = "Convert XISF images to FITS")]
#[command(version)]
struct Cli {
    /// Directory for the FITS files (default: next to each input)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Convert image N of each container
    #[arg(long, value_name = "N", default_value_t = 0, conflicts_with = "all")]
    image: usize,

    /// Convert every image, writing <stem>_<n>.fits
    #[arg(long)]
    all: bool,

    /// Store UInt16 data with BZERO = 32768
    #[arg(long)]
    unsigned_offset: bool,

    /// Accept containers without images
    #[arg(long)]
    lenient: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// XISF files to convert
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(dir) = &cli.output {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: cannot create {}: {}", dir.display(), e);
            process::exit(1);
        }
    }

    let opts = ConvertOptions::default()
        .with_strict(!cli.lenient)
        .with_unsigned_offset(cli.unsigned_offset);
    let selection = if cli.all {
        Selection::All
    } else {
        Selection::Image(cli.image)
    };

    let failed: usize = cli
        .files
        .par_iter()
        .map(|input| {
            match convert_path(input, cli.output.as_deref(), selection, &opts) {
                Ok(report) => {
                    for path in &report.written {
                        println!("{} -> {}", input.display(), path.display());
                    }
                    for (index, e) in &report.failures {
                        eprintln!("Error: {} image {}: {}", input.display(), index, e);
                    }
                    usize::from(!report.failures.is_empty())
                }
                Err(e) => {
                    eprintln!("Error: {}: {}", input.display(), e);
                    1
                }
            }
        })
        .sum();

    if failed > 0 {
        eprintln!("{} of {} files failed", failed, cli.files.len());
        process::exit(1);
    }
}
