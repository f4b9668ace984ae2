use std::process::ExitCode;

use clap::Parser;
use console::style;

use taxograph::cli::{App, Cli};
use taxograph::config::load_config;
use taxograph::error::Result;
use taxograph::observability::init_logging;

fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    init_logging(&config.logging.filter);

    let mut app = App::open(config, cli.json)?;
    let outcome = app.execute(cli.command);
    if cli.metrics {
        eprintln!("{}", app.metrics.to_json());
    }
    let output = outcome?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}
