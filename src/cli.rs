//! CLI argument parsing for Perfmon

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::probe::ProbeStream;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "perfmon")]
#[command(version)]
#[command(about = "Inject method timing probes into JVM class files", long_about = None)]
pub struct Cli {
    /// A .class file or a directory tree of class files
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Where to write transformed classes (file for file input, directory for directory input)
    #[arg(short = 'o', long = "output", value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Filter classes (e.g., -e include=com.example or -e exclude=com.example.gen); repeatable
    #[arg(short = 'e', long = "expr", value_name = "EXPR")]
    pub filter: Vec<String>,

    /// Print the decoded structure of each class instead of transforming it
    #[arg(long = "inspect")]
    pub inspect: bool,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Show a summary of outcomes after the run
    #[arg(short = 'c', long = "summary")]
    pub summary: bool,

    /// Worker threads for directory input (default: available parallelism)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Stream the injected probes print to
    #[arg(long = "stream", value_enum)]
    pub stream: Option<ProbeStream>,

    /// TOML configuration file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable self-profiling to measure time spent per pipeline stage
    #[arg(long = "profile-self")]
    pub profile_self: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_input() {
        let cli = Cli::parse_from(["perfmon", "Foo.class"]);
        assert_eq!(cli.input, PathBuf::from("Foo.class"));
        assert!(cli.output.is_none());
        assert!(cli.filter.is_empty());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["perfmon"]).is_err());
    }

    #[test]
    fn test_cli_repeated_filters() {
        let cli = Cli::parse_from([
            "perfmon",
            "-e",
            "include=com.example",
            "--expr",
            "exclude=com.example.gen",
            "classes",
        ]);
        assert_eq!(
            cli.filter,
            vec!["include=com.example", "exclude=com.example.gen"]
        );
    }

    #[test]
    fn test_cli_output_and_jobs() {
        let cli = Cli::parse_from(["perfmon", "in", "-o", "out", "-j", "4"]);
        assert_eq!(cli.output, Some(PathBuf::from("out")));
        assert_eq!(cli.jobs, Some(4));
    }

    #[test]
    fn test_cli_stream_flag() {
        let cli = Cli::parse_from(["perfmon", "--stream", "err", "in"]);
        assert_eq!(cli.stream, Some(ProbeStream::Err));
        let cli = Cli::parse_from(["perfmon", "in"]);
        assert!(cli.stream.is_none());
        assert!(Cli::try_parse_from(["perfmon", "--stream", "log", "in"]).is_err());
    }

    #[test]
    fn test_cli_profile_self_default_false() {
        let cli = Cli::parse_from(["perfmon", "in"]);
        assert!(!cli.profile_self);
        assert!(!cli.debug);
        assert!(!cli.summary);
    }

    #[test]
    fn test_cli_inspect_json() {
        let cli = Cli::parse_from(["perfmon", "--inspect", "--format", "json", "-c", "in"]);
        assert!(cli.inspect);
        assert!(cli.summary);
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
