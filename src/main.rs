use anyhow::Result;
use clap::Parser;
use commitaudit::cli::{run, Cli};
use commitaudit::logging::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_format);
    run(cli)
}
