//! KScr CLI

use clap::{Parser, Subcommand};
use kscr::bytecode::{ClassDecl, codec};
use kscr::config::{Compression, RuntimeConfig};
use kscr::interp::Interpreter;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "kscr", version, about = "KScr - tree-walking interpreter for the KScr scripting language")]
struct Cli {
    /// Log interpreter activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile and run a KScr source file
    Run {
        /// Source file to run
        file: PathBuf,
        /// Runtime configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Source file to tokenize
        file: PathBuf,
    },
    /// Compile a source file and write its bytecode
    Dump {
        /// Source file to compile
        file: PathBuf,
        /// Output path (defaults to the source path with a .kbin extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// none, gzip or zlib
        #[arg(long)]
        compression: Option<Compression>,
    },
    /// Run previously written bytecode
    Exec {
        /// Bytecode file
        file: PathBuf,
        /// Runtime configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Run { file, config } => run_file(&file, config.as_deref()),
        Command::Tokens { file } => tokenize_file(&file).map(|()| 0),
        Command::Dump {
            file,
            output,
            compression,
        } => dump_file(&file, output, compression).map(|()| 0),
        Command::Exec { file, config } => exec_file(&file, config.as_deref()),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> CliResult<RuntimeConfig> {
    Ok(match path {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    })
}

/// Compile `path`, printing a diagnostic on failure.
fn compile_file(path: &Path) -> CliResult<Option<Vec<ClassDecl>>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();
    match kscr::compiler::compile(&filename, &source) {
        Ok(classes) => Ok(Some(classes)),
        Err(e) => {
            kscr::error::report_error(&filename, &source, &e)?;
            Ok(None)
        }
    }
}

fn run_file(path: &Path, config: Option<&Path>) -> CliResult<i32> {
    let config = load_config(config)?;
    match compile_file(path)? {
        Some(classes) => execute(classes, config),
        None => Ok(1),
    }
}

fn exec_file(path: &Path, config: Option<&Path>) -> CliResult<i32> {
    let config = load_config(config)?;
    let bytes = std::fs::read(path)?;
    let classes = codec::load(&bytes)?;
    execute(classes, config)
}

fn execute(classes: Vec<ClassDecl>, config: RuntimeConfig) -> CliResult<i32> {
    let debug = config.debug;
    let mut vm = Interpreter::new(config)?;
    vm.load(classes)?;
    match vm.execute() {
        Ok(code) => Ok(code),
        Err(err) => {
            if debug {
                eprintln!("{err:?}");
            } else {
                eprintln!("{err}");
            }
            for element in vm.stack_trace() {
                eprintln!("\t{element}");
            }
            Ok(vm.exit_code())
        }
    }
}

fn dump_file(path: &Path, output: Option<PathBuf>, compression: Option<Compression>) -> CliResult<()> {
    let Some(classes) = compile_file(path)? else {
        return Err("compilation failed".into());
    };
    let compression = compression.unwrap_or_default();
    let bytes = codec::write(&classes, compression)?;
    let output = output.unwrap_or_else(|| path.with_extension("kbin"));
    std::fs::write(&output, &bytes)?;
    println!(
        "Wrote {} classes ({} bytes, {compression}) to {}",
        classes.len(),
        bytes.len(),
        output.display()
    );
    Ok(())
}

fn tokenize_file(path: &Path) -> CliResult<()> {
    let source = std::fs::read_to_string(path)?;

    let tokens = kscr::lexer::tokenize(&source)?;
    for (tok, span) in &tokens {
        println!("{:?} @ {}..{}", tok, span.start, span.end);
    }

    Ok(())
}
