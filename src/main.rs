use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use name_avail::dispatch::dispatch;
use name_avail::probe::Client;
use name_avail::registry::{Registry, checkers};

#[derive(Parser)]
#[command(
    name = "name-avail",
    about = "Check whether a package name is available across major package registries",
    after_help = "Queries PyPI, npm, RubyGems, Maven Central, NuGet, Packagist, \
                  Homebrew and the Debian package tracker in parallel.\n\n\
                  A registry that cannot be reached is reported inline with the \
                  reason; it does not affect the exit status."
)]
struct Cli {
    /// Package name to check (use `--` before names starting with `-`)
    name: String,
}

fn main() -> ExitCode {
    reset_sigpipe();
    init_tracing();

    let cli = Cli::parse();
    if cli.name.is_empty() {
        eprintln!("error: package name cannot be empty");
        eprintln!("usage: name-avail <NAME>");
        return ExitCode::from(2);
    }

    let client = Client::new();
    let results = dispatch(&cli.name, &checkers(&client));

    for registry in Registry::ALL {
        if let Some(outcome) = results.get(registry.name()) {
            println!("{registry}: {outcome}");
        }
    }

    ExitCode::SUCCESS
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();
}

// Exit quietly when stdout is closed early, e.g. `name-avail foo | head -1`.
#[cfg(unix)]
fn reset_sigpipe() {
    // SAFETY: runs first thing in main, before any other thread exists.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

#[cfg(not(unix))]
fn reset_sigpipe() {}
