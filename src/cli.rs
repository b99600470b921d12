//! CLI argument parsing for the calltrace driver

use clap::{Parser, ValueEnum};

/// Output format for the trace summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// strace-style table on stderr (default)
    Text,
    /// JSON document on stdout
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "calltrace")]
#[command(version)]
#[command(
    about = "Drive a synthetic call workload through the instrumentation layer and report counts and durations",
    long_about = None
)]
pub struct Cli {
    /// Comma-separated operation catalog; ids are assigned in order
    #[arg(long = "ops", value_name = "NAMES", default_value = "alloc,free,call")]
    pub ops: String,

    /// Number of instrumented calls per operation
    #[arg(short = 'n', long = "iterations", value_name = "N", default_value = "1000")]
    pub iterations: u64,

    /// Busy-work loop length inside each call
    #[arg(long = "work", value_name = "STEPS", default_value = "64")]
    pub work: u32,

    /// Install enter/exit observers that print each call to stdout
    #[arg(long = "print-calls")]
    pub print_calls: bool,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
