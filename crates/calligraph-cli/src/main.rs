use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use calligraph::{Analyzer, AnalyzerOptions, to_dot, to_json};
use clap::{Parser, ValueEnum};

/// Static call-graph analyzer for Python source trees.
#[derive(Parser)]
#[command(name = "calligraph", version, about)]
struct Cli {
    /// Python files or directories (searched recursively for *.py).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Explicit project root; inferred from the inputs when omitted.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Output format written to stdout.
    #[arg(long, value_enum, default_value = "dot")]
    format: Format,

    /// Omit defines edges from the output.
    #[arg(long)]
    no_defines: bool,

    /// Omit uses edges from the output.
    #[arg(long)]
    no_uses: bool,

    /// Attach filename:lineno labels to nodes.
    #[arg(long)]
    annotate: bool,

    /// Color nodes by their defining file.
    #[arg(long)]
    colored: bool,

    /// Increase log verbosity (-v: info, -vv: debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Dot,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let mut files = Vec::new();
    for input in &cli.inputs {
        if let Err(err) = collect_python_files(input, &mut files) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    }
    if files.is_empty() {
        eprintln!("error: no Python files found in the given inputs");
        return ExitCode::FAILURE;
    }

    let options = AnalyzerOptions {
        draw_defines: !cli.no_defines,
        draw_uses: !cli.no_uses,
        root: cli.root.clone(),
        color_by_file: cli.colored,
        annotate: cli.annotate,
    };
    let mut analyzer = Analyzer::new(options);
    for file in &files {
        analyzer = match analyzer.add_file(file) {
            Ok(analyzer) => analyzer,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        };
    }

    let analysis = match analyzer.analyze() {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    for skipped in &analysis.skipped {
        eprintln!("warning: {}", skipped.message);
    }

    match cli.format {
        Format::Dot => print!("{}", to_dot(&analysis.graph)),
        Format::Json => match to_json(&analysis.graph) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
    }
    ExitCode::SUCCESS
}

/// Collects `*.py` files from a file or directory input, recursing into
/// directories in sorted order so runs are deterministic.
fn collect_python_files(input: &Path, files: &mut Vec<PathBuf>) -> Result<(), String> {
    let metadata = fs::metadata(input).map_err(|err| format!("cannot read {}: {err}", input.display()))?;
    if metadata.is_file() {
        files.push(input.to_path_buf());
        return Ok(());
    }
    if !metadata.is_dir() {
        return Err(format!("{} is neither a file nor a directory", input.display()));
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(input)
        .map_err(|err| format!("cannot read {}: {err}", input.display()))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            collect_python_files(&entry, files)?;
        } else if entry.extension().is_some_and(|ext| ext == "py") {
            files.push(entry);
        }
    }
    Ok(())
}
