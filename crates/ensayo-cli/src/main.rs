//! Ensayo CLI: run declarative browser scenarios
//!
//! ## Usage
//!
//! ```bash
//! ensayo validate scenarios/greenkart.yaml
//! ensayo run scenarios/greenkart.yaml --config ensayo.yaml --headed
//! ensayo run scenarios/greenkart.yaml --format json > report.json
//! ensayo config --base-url https://shop.test/
//! ```

use clap::Parser;
use ensayo_cli::{
    load_engine_config, load_scenario, outcome, render_report, Cli, CliConfig, CliResult,
    Commands, ConfigArgs, OutputFormat, ProgressReporter, RunArgs, ScenarioCommand,
    ValidateArgs, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    config.init_logging();

    match cli.command {
        Commands::Run(args) => run_scenario(&config, &args),
        Commands::Validate(args) => run_validate(&config, &args),
        Commands::Config(args) => run_config(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
        .with_log_json(cli.log_json)
}

fn reporter(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
}

fn run_scenario(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let scenario = load_scenario(&args.scenario)?;
    let engine = load_engine_config(args.overrides.config.as_deref(), &args.overrides.overrides())?;
    let format: OutputFormat = args.format.into();
    let mut reporter = reporter(config);

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(
        ScenarioCommand::new(engine)
            .with_step_trace(!args.no_trace_steps)
            .execute(&scenario, &mut reporter),
    )?;

    match format {
        OutputFormat::Json => println!("{}", render_report(&report, format)?),
        OutputFormat::Text => {
            reporter.report(&report);
            if config.verbosity.is_verbose() {
                print!("{}", render_report(&report, format)?);
            }
        }
    }
    outcome(&report)
}

fn run_validate(config: &CliConfig, args: &ValidateArgs) -> CliResult<()> {
    let reporter = reporter(config);
    let scenario = load_scenario(&args.scenario)?;
    reporter.success(&format!(
        "{}: '{}' is valid ({} locators, {} steps)",
        args.scenario.display(),
        scenario.name,
        scenario.locators.len(),
        scenario.steps.len()
    ));
    Ok(())
}

fn run_config(args: &ConfigArgs) -> CliResult<()> {
    let engine = load_engine_config(args.overrides.config.as_deref(), &args.overrides.overrides())?;
    print!("{}", engine.to_yaml()?);
    Ok(())
}
