//! Logging setup for the command-line tool.
//!
//! Library crates only emit `tracing` events; this module decides what gets
//! printed. `RUST_LOG` overrides the level picked from the command line:
//!
//! ```bash
//! RUST_LOG=stkpak_gpk=trace stkpak list BGM.GPK
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose events are shown by default.
const CRATES: &[&str] = &["stkpak", "stkpak_common", "stkpak_gpk", "stkpak_ogg"];

/// Logging options gathered from `-v` / `-q`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// Number of `-v` flags.
    pub verbosity: u8,
    /// Only show errors.
    pub quiet: bool,
}

impl LogConfig {
    /// Level for the stkpak crates.
    pub fn level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Filter directives used when `RUST_LOG` is unset.
    pub fn directives(&self) -> String {
        let level = self.level().as_str().to_ascii_lowercase();
        CRATES
            .iter()
            .map(|krate| format!("{krate}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Install the global subscriber. Later calls are ignored.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.directives()));

        let verbose = self.verbosity >= 3;
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_thread_ids(verbose)
                .compact(),
        );

        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
