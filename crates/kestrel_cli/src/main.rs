//! kimg: inspect exported Kestrel program images.
//!
//! Usage:
//!   kimg dump [--globals] [--classes] [--functions] <image>
//!   kimg check <image>
//!
//! Set `KESTREL_LOG` (or `RUST_LOG`) to see resolver tracing on stderr.

mod dump;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use kestrel_resolver::ResolutionContext;
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::dump::Sections;

#[derive(Parser, Debug)]
#[command(name = "kimg", about = "Inspect Kestrel program images", version)]
struct Cli {
    /// Log resolver activity at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the globals, class layouts and functions of an image.
    Dump {
        image: PathBuf,

        /// Print only the global table.
        #[arg(long)]
        globals: bool,

        /// Print only class layouts.
        #[arg(long)]
        classes: bool,

        /// Print only functions.
        #[arg(long)]
        functions: bool,
    },
    /// Load and validate an image without printing it.
    Check { image: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Dump {
            image,
            globals,
            classes,
            functions,
        } => {
            let ctx = load(&image)?;
            let sections = if globals || classes || functions {
                Sections {
                    globals,
                    classes,
                    functions,
                }
            } else {
                Sections::ALL
            };
            let mut out = String::new();
            dump::render(&ctx, sections, &mut out).into_diagnostic()?;
            print!("{}", out);
        }
        Command::Check { image } => {
            let ctx = load(&image)?;
            println!(
                "{}: ok ({} globals, {} scopes)",
                image.display(),
                ctx.globals().len(),
                ctx.scopes().len()
            );
        }
    }
    Ok(())
}

fn load(path: &Path) -> Result<ResolutionContext> {
    debug!(path = %path.display(), "loading image");
    let file = File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot open {}", path.display()))?;
    ResolutionContext::import_from(BufReader::new(file))
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot load image {}", path.display()))
}

/// Filter from `KESTREL_LOG`, then `RUST_LOG`; `--verbose` forces debug.
/// Output goes to stderr so it never mixes with the dump.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if let Ok(val) = std::env::var("KESTREL_LOG") {
        EnvFilter::builder().parse_lossy(val)
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        return;
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
