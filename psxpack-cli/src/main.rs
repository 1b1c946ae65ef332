//! psxpack CLI
//!
//! Command-line interface for ripping, rebuilding, and patching
//! PlayStation 1 BIN/CUE disc images.

use std::io::Write;
use std::path::PathBuf;
use std::process;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use psxpack_lib::{
    BuildOptions, BuildProgress, EngineError, RipOptions, RipProgress, build, inject, lbn_table,
    rip,
};

#[derive(Parser)]
#[command(name = "psxpack")]
#[command(version)]
#[command(about = "Disassemble and rebuild PlayStation 1 disc images", long_about = None)]
struct Cli {
    /// Print informational messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Disassemble a BIN/CUE image into a catalog and file tree
    Rip {
        /// Input image (.cue)
        input: PathBuf,

        /// Output base name (defaults to the input name without extension)
        output: Option<PathBuf>,

        /// Write LBNs to the catalog file
        #[arg(short = 'l', long)]
        lbns: bool,

        /// Mark the catalog for a strict rebuild (implies --lbns)
        #[arg(short, long)]
        strict: bool,

        /// Print the LBN table and exit
        #[arg(short = 't', long)]
        lbn_table: bool,

        /// Repair Y2K-damaged timestamps instead of preserving them
        #[arg(short, long)]
        fix: bool,
    },

    /// Build a BIN image from a catalog
    Build {
        /// Input catalog (.cat)
        input: PathBuf,

        /// Output base name (defaults to the input name without extension)
        output: Option<PathBuf>,

        /// Also create a .cue file
        #[arg(short, long)]
        cuefile: bool,
    },

    /// Replace the contents of one file inside an existing image
    Inject {
        /// Input image (.cue)
        input: PathBuf,

        /// Path of the file inside the image (slash separated)
        repl_path: String,

        /// Host file holding the new contents
        new_file: PathBuf,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 64,
            };
            let _ = e.print();
            process::exit(code);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "info" } else { "warn" },
    ))
    .format_timestamp(None)
    .init();

    let result = match cli.command {
        Commands::Rip {
            input,
            output,
            lbns,
            strict,
            lbn_table: print_table,
            fix,
        } => run_rip(input, output, lbns, strict, print_table, fix),
        Commands::Build {
            input,
            output,
            cuefile,
        } => run_build(input, output, cuefile),
        Commands::Inject {
            input,
            repl_path,
            new_file,
        } => run_inject(input, repl_path, new_file),
    };

    if let Err(e) = result {
        eprintln!(
            "{} {}",
            "\u{2718}".if_supports_color(Stdout, |t| t.red()),
            e,
        );
        process::exit(1);
    }
}

/// Normalize the rip input path: bare names and .bin inputs refer to the
/// CUE sheet next to them.
fn cue_input_path(input: PathBuf) -> PathBuf {
    match input.extension().and_then(|e| e.to_str()) {
        Some("cue") => input,
        _ => input.with_extension("cue"),
    }
}

fn default_output(input: &PathBuf) -> PathBuf {
    input.with_extension("")
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap()
            .tick_chars("/-\\|"),
    );
    pb
}

fn run_rip(
    input: PathBuf,
    output: Option<PathBuf>,
    lbns: bool,
    strict: bool,
    print_table: bool,
    fix: bool,
) -> Result<(), EngineError> {
    let cue_path = cue_input_path(input);

    if print_table {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        lbn_table(&cue_path, &mut lock)?;
        return Ok(());
    }

    let output = output.unwrap_or_else(|| default_output(&cue_path));
    let options = RipOptions {
        write_lbns: lbns || strict,
        strict,
        fix_dates: fix,
    };

    println!(
        "Analyzing image {}...",
        cue_path.display().if_supports_color(Stdout, |t| t.cyan()),
    );

    let pb = spinner();
    let progress = |p: RipProgress| match p {
        RipProgress::Analyzing => {
            pb.set_message("Analyzing track layout");
            pb.tick();
        }
        RipProgress::SystemArea => {
            pb.set_message("Dumping system area");
            pb.tick();
        }
        RipProgress::Directory { path } => {
            pb.set_message(format!("Dumping {path}"));
            pb.tick();
        }
        RipProgress::AudioTrack { number } => {
            pb.set_message(format!("Writing audio track {number:02}"));
            pb.tick();
        }
        RipProgress::Done => pb.finish_and_clear(),
    };

    let summary = rip(&cue_path, &output, &options, &progress)?;
    pb.finish_and_clear();

    println!(
        "{} Volume {} ripped to {}",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        summary.volume_id.if_supports_color(Stdout, |t| t.bold()),
        output.display(),
    );
    println!(
        "  {} files, {} directories, {} audio tracks",
        summary.files, summary.directories, summary.audio_tracks,
    );
    for name in &summary.incomplete {
        println!(
            "  {} {} may be incomplete",
            "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
            name,
        );
    }
    Ok(())
}

fn run_build(
    input: PathBuf,
    output: Option<PathBuf>,
    cuefile: bool,
) -> Result<(), EngineError> {
    let catalog_path = match input.extension().and_then(|e| e.to_str()) {
        Some("cat") => input,
        _ => input.with_extension("cat"),
    };
    let output = output.unwrap_or_else(|| default_output(&catalog_path));
    let options = BuildOptions { write_cue: cuefile };

    println!(
        "Reading catalog file {}...",
        catalog_path.display().if_supports_color(Stdout, |t| t.cyan()),
    );

    let pb = spinner();
    let progress = |p: BuildProgress| match p {
        BuildProgress::Parsing => {
            pb.set_message("Parsing catalog");
            pb.tick();
        }
        BuildProgress::Allocating => {
            pb.set_message("Allocating sectors");
            pb.tick();
        }
        BuildProgress::WritingData => {
            pb.set_message("Writing filesystem data");
            pb.tick();
        }
        BuildProgress::Postgap => {
            pb.set_message("Writing postgap");
            pb.tick();
        }
        BuildProgress::AudioTrack { number } => {
            pb.set_message(format!("Appending audio track {number:02}"));
            pb.tick();
        }
        BuildProgress::Done => pb.finish_and_clear(),
    };

    let summary = build(&catalog_path, &output, &options, &progress)?;
    pb.finish_and_clear();

    println!(
        "{} Image file written to {} ({} sectors)",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        summary.image_path.display().if_supports_color(Stdout, |t| t.bold()),
        summary.volume_sectors,
    );
    if let Some(cue) = summary.cue_path {
        println!("  Cue file written to {}", cue.display());
    }
    Ok(())
}

fn run_inject(input: PathBuf, repl_path: String, new_file: PathBuf) -> Result<(), EngineError> {
    let cue_path = cue_input_path(input);

    let summary = inject(&cue_path, &repl_path, &new_file)?;

    println!(
        "{} Replaced {} at sector {} ({} bytes)",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        repl_path.if_supports_color(Stdout, |t| t.bold()),
        summary.lbn,
        summary.new_size,
    );
    std::io::stdout().flush().ok();
    Ok(())
}
