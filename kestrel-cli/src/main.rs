use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kestrel_core::{
    CompilationArtifact, CompilerOptions, DEFAULT_MAX_ERRORS, ImportResolver, SEARCH_PATH_VAR,
    compile, compile_source, default_library_root,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable read for the log filter.
const LOG_ENV: &str = "KESTREL_LOG";

/// Command line of the `kestrel` front end.
#[derive(Parser, Debug)]
#[command(name = "kestrel", version, about = "Kestrel compiler front end", long_about = None)]
struct Cli {
    /// Main module; read from stdin when omitted
    input: Option<PathBuf>,

    #[arg(
        short = 'I',
        long = "include",
        value_name = "DIR",
        help = "Extra import directory, searched before KESTREL_PATH and the library"
    )]
    include: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Path to the library root (defaults to the bundled lib)"
    )]
    lib_root: Option<PathBuf>,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ERRORS)]
    max_errors: usize,

    #[arg(long, value_enum, default_value_t = Emit::None, help = "What to print after compiling")]
    emit: Emit,

    #[arg(long, help = "List importable modules and exit unless an input is given")]
    list_modules: bool,

    #[arg(short, long, value_name = "FILE", help = "Write the emitted text here instead of stdout")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    None,
    Tokens,
    Tree,
    Combined,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    execute(cli)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let library_root = cli.lib_root.clone().unwrap_or_else(default_library_root);
    let search_paths = CompilerOptions::search_path(
        &cli.include,
        env::var_os(SEARCH_PATH_VAR).as_deref(),
        &library_root,
    )?;
    let options = CompilerOptions {
        search_paths,
        max_errors: cli.max_errors,
        echo_diagnostics: true,
        ..CompilerOptions::default()
    };

    if cli.list_modules {
        let resolver = ImportResolver::new(options.search_paths.clone(), options.extensions.clone());
        for name in resolver.available_modules() {
            println!("{name}");
        }
        if cli.input.is_none() {
            return Ok(());
        }
    }

    let artifact = match &cli.input {
        Some(path) => compile(path, &options)
            .with_context(|| format!("failed to compile {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            compile_source("<stdin>", &buffer, &options).context("failed to compile <stdin>")?
        }
    };
    info!(modules = artifact.modules.len(), "compilation finished");

    let Some(text) = emitted_text(cli.emit, artifact) else {
        return Ok(());
    };
    match &cli.output {
        Some(path) => write_output(path, text.as_bytes())?,
        None => print!("{text}"),
    }
    Ok(())
}

fn emitted_text(emit: Emit, artifact: CompilationArtifact) -> Option<String> {
    match emit {
        Emit::None => None,
        Emit::Tokens => Some(artifact.token_dump),
        Emit::Tree => Some(artifact.tree_dump),
        Emit::Combined => Some(artifact.combined_dump),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}
