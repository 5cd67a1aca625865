use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Parser};
use console::style;
use memrun::{Launcher, Outcome};

mod report;
mod settings;

const DEMO: &str = r#"puts("Hello");"#;

#[derive(Parser)]
#[command(name = "memrun")]
#[command(about = "Compile C statements in memory and run them in-process", long_about = None)]
struct Cli {
    /// Statements to run inside `Main_main(argc, args)`
    statements: Option<String>,

    /// Read the statements from a file
    #[arg(short, long, conflicts_with = "statements")]
    file: Option<PathBuf>,

    /// Skeleton with a single `%s` placeholder [env: MEMRUN_TEMPLATE]
    #[arg(long)]
    template: Option<PathBuf>,

    /// C compiler driver [env: MEMRUN_CC, CC]
    #[arg(long)]
    cc: Option<PathBuf>,

    /// Extra compiler flag, repeatable [env: MEMRUN_CFLAGS]
    #[arg(long = "cflag", allow_hyphen_values = true)]
    cflags: Vec<String>,

    /// Stage compiled objects in a private temporary directory instead of memory files
    #[arg(long)]
    private_dir: bool,

    /// Render diagnostics with source excerpts
    #[arg(long)]
    pretty: bool,

    /// Print elapsed milliseconds
    #[arg(long)]
    time: bool,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Arguments passed to the entry function
    #[arg(last = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let started = Instant::now();
    let cli = Cli::parse();
    settings::init_tracing(cli.verbose);

    let statements = match (&cli.file, &cli.statements) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read statements from {:?}", path))?,
        (None, Some(statements)) => statements.clone(),
        (None, None) => DEMO.to_string(),
    };

    let launcher = match Launcher::new(settings::config(&cli)) {
        Ok(launcher) => launcher,
        Err(e) if e.is_toolchain_unavailable() => {
            println!("Could not find a C compiler, memrun needs a toolchain");
            tracing::debug!(error = %e, "Toolchain discovery failed");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to set up launcher"),
    };

    match launcher.run(&statements, &cli.args)? {
        Outcome::Completed => {}
        Outcome::CompilationFailed(diagnostics) => {
            let unit = launcher.expand(&statements);
            report::print_diagnostics(&unit, &diagnostics, cli.pretty);
        }
    }

    if cli.time {
        println!(
            "{} {}",
            style("time").dim(),
            started.elapsed().as_millis()
        );
    }

    Ok(())
}
