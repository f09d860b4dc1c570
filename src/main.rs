use anyhow::Context;
use clap::Parser;
use poorperf::cli::{Cli, Command, Mode};
use poorperf::config::ProfilerConfig;
use poorperf::error::exit_code;
use poorperf::signal::{self, CancelFlag};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(poorperf_err) = e.downcast_ref::<poorperf::Error>() {
                ExitCode::from(poorperf_err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Completions { shell }) = cli.command {
        use clap::CommandFactory;
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "poorperf", &mut std::io::stdout());
        return Ok(());
    }

    // Validate CLI arguments
    cli.validate()
        .map_err(poorperf::Error::InvalidArgument)
        .context("Invalid arguments")?;

    let config = ProfilerConfig::from_cli(&cli);

    let cancel = CancelFlag::new();
    signal::install_handler(&cancel)?;

    match cli.mode {
        Mode::Watchdog => poorperf::commands::watchdog::run(&config, &cancel)?,
        Mode::Oneshot => poorperf::commands::oneshot::run(&config, &cancel)?,
    }

    Ok(())
}
