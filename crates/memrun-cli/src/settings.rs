use memrun::{LauncherConfig, ScratchMode};
use tracing_subscriber::EnvFilter;

use crate::Cli;

/// Environment first, then whatever was given on the command line.
pub fn config(cli: &Cli) -> LauncherConfig {
    let mut config = LauncherConfig::from_env();

    if let Some(cc) = &cli.cc {
        config = config.with_compiler(cc);
    }
    if let Some(template) = &cli.template {
        config = config.with_template(template);
    }
    if !cli.cflags.is_empty() {
        config.flags.extend(cli.cflags.iter().cloned());
    }
    if cli.private_dir {
        config = config.with_scratch(ScratchMode::PrivateDir);
    }

    config
}

/// Logs go to stderr; stdout belongs to the fragment and the diagnostics.
pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
