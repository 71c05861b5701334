use clap::Parser;
use walksweep::{Args, init_logging};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let report = walksweep::run(&args)?;

    tracing::info!(
        completed = report.completed(),
        total = report.total,
        "all runs recorded"
    );
    Ok(())
}
