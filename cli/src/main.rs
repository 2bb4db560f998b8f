use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use scg_compiler::{compile, CompileOptions, ScgError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scg")]
#[command(about = "Check or dump .scg schema files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and resolve every schema file under a directory (or a single file)
    Check {
        /// Input directory or `.scg` file
        #[arg(short, long)]
        input: PathBuf,

        /// JSON file with compile options
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Like `check`, then print the resolved packages and files as JSON
    Dump {
        /// Input directory or `.scg` file
        #[arg(short, long)]
        input: PathBuf,

        /// JSON file with compile options
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output `.json` file (if omitted, prints to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_options(config: Option<&Path>) -> Result<CompileOptions, ScgError> {
    match config {
        Some(path) => CompileOptions::from_json(&fs::read_to_string(path)?),
        None => Ok(CompileOptions::default()),
    }
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<(), ScgError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, extension, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(path);
        }
    }
    Ok(())
}

/// Reads every schema file, keyed by its path relative to `input`.
fn read_sources(input: &Path, options: &CompileOptions) -> Result<BTreeMap<String, String>, ScgError> {
    let (root, paths) = if input.is_dir() {
        let mut paths = Vec::new();
        collect_files(input, &options.extension, &mut paths)?;
        (input.to_path_buf(), paths)
    } else {
        let root = input.parent().map(Path::to_path_buf).unwrap_or_default();
        (root, vec![input.to_path_buf()])
    };

    let mut sources = BTreeMap::new();
    for path in paths {
        let key = path.strip_prefix(&root).unwrap_or(&path).to_string_lossy().into_owned();
        debug!(file = %key, "reading");
        sources.insert(key, fs::read_to_string(&path)?);
    }
    Ok(sources)
}

fn run(cli: Cli) -> Result<(), ScgError> {
    match cli.command {
        Commands::Check { input, config } => {
            let options = load_options(config.as_deref())?;
            let sources = read_sources(&input, &options)?;
            let parse = compile(&sources, &options)?;
            for (name, package) in &parse.packages {
                println!(
                    "{}: {} file(s), {} message(s), {} service(s), {} stream(s)",
                    name,
                    package.files.len(),
                    package.messages.len(),
                    package.services.len(),
                    package.streams.len()
                );
            }
        }
        Commands::Dump { input, config, output } => {
            let options = load_options(config.as_deref())?;
            let sources = read_sources(&input, &options)?;
            let parse = compile(&sources, &options)?;
            let json = serde_json::to_string_pretty(&parse)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)?;
                    info!(output = %path.display(), "wrote dump");
                }
                None => println!("{}", json),
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
