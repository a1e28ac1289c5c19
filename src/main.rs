use anyhow::Result;
use clap::Parser;
use perfmon::{
    cli::Cli,
    config::FileConfig,
    probe::{ProbeStream, ProbeTemplate},
    runner::{self, RunConfig},
};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    if args.jobs == Some(0) {
        anyhow::bail!("Invalid value for --jobs: 0 (must be >= 1)");
    }

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    // CLI flags override the config file
    let file_config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let filter = file_config.filter(&args.filter)?;
    let stream: ProbeStream = args
        .stream
        .or(file_config.stream)
        .unwrap_or_default();

    let config = RunConfig {
        input: args.input,
        output: args.output,
        filter,
        template: ProbeTemplate::for_stream(stream).clone(),
        jobs: args.jobs.or(file_config.jobs).unwrap_or_else(default_jobs),
        format: args.format,
        summary: args.summary,
        inspect: args.inspect,
        profile_self: args.profile_self,
    };

    runner::run(&config)?;

    Ok(())
}
