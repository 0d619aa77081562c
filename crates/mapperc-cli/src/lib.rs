mod build;
mod cli;
mod config;
mod dialects;
mod entities;
mod explain;
mod init;
mod list;
mod project;
mod write;

pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    init_logging();

    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Init(args) => init::run(args),
        cli::Command::Build(args) => build::run(args),
        cli::Command::List(args) => list::run(args),
        cli::Command::Explain(args) => explain::run(args),
        cli::Command::Dialects => {
            dialects::run();
            Ok(())
        }
    }
}

/// Log to stderr, filtered by `MAPPERC_LOG` (default: warnings).
fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_env("MAPPERC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second `run` in the same process keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
