//! Command-line arguments for the `bookshelf` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bookshelf", version, about = "Book catalog with call instrumentation")]
pub struct Args {
    /// Configuration file path (defaults to ./bookshelf.yaml when present)
    #[arg(short, long, env = "BOOKSHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP catalog service (default)
    Serve,

    /// Run a fixed battery of queries against the store and report on them
    Analyze,

    /// Drive a running server through the instrumented client
    PerfTest {
        /// Server base URL
        #[arg(long, default_value = "http://localhost:5000")]
        base_url: String,

        /// Number of concurrent list requests
        #[arg(long, default_value_t = 5)]
        concurrency: usize,

        /// Number of books inserted for the large dataset phase
        #[arg(long, default_value_t = 10)]
        batch: usize,
    },
}

impl Args {
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default() {
        let args = Args::try_parse_from(["bookshelf"]).unwrap();
        assert_eq!(args.subcommand(), Command::Serve);
    }

    #[test]
    fn parses_perf_test_options() {
        let args = Args::try_parse_from([
            "bookshelf",
            "perf-test",
            "--base-url",
            "http://127.0.0.1:9000",
            "--concurrency",
            "8",
            "-c",
            "custom.yaml",
        ])
        .unwrap();
        assert_eq!(
            args.subcommand(),
            Command::PerfTest {
                base_url: "http://127.0.0.1:9000".into(),
                concurrency: 8,
                batch: 10,
            }
        );
        assert_eq!(args.config, Some(PathBuf::from("custom.yaml")));
    }

    #[test]
    fn verifies_cli() {
        <Args as clap::CommandFactory>::command().debug_assert();
    }
}
