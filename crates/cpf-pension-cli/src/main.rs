mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::cpf::{PayoutArgs, PolicyArgs, ScenarioArgs, SimulateArgs};
use commands::time_value::{IrrArgs, NpvArgs};

/// CPF pension simulations with decimal precision
#[derive(Parser)]
#[command(
    name = "cpfp",
    version,
    about = "CPF pension simulations, annuity payouts and IRR analysis",
    long_about = "A CLI for simulating CPF contributions over a working life, converting \
                  the Retirement account into a monthly annuity, and measuring the member's \
                  return with IRR and NPV. All arithmetic uses decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate lifetime contributions and the age-55 transfer
    Simulate(SimulateArgs),
    /// Convert a Retirement balance into a monthly payout schedule
    Payout(PayoutArgs),
    /// Print the member's signed cash flows for a scenario
    CashFlows(ScenarioArgs),
    /// Internal rate of return of a cash-flow series
    Irr(IrrArgs),
    /// Net present value of a cash-flow series
    Npv(NpvArgs),
    /// Evaluate a full pension scenario (single or batch)
    Scenario(ScenarioArgs),
    /// Print a contribution policy schedule
    Policy(PolicyArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Simulate(args) => commands::cpf::run_simulate(args),
        Commands::Payout(args) => commands::cpf::run_payout(args),
        Commands::CashFlows(args) => commands::cpf::run_cash_flows(args),
        Commands::Irr(args) => commands::time_value::run_irr(args),
        Commands::Npv(args) => commands::time_value::run_npv(args),
        Commands::Scenario(args) => commands::cpf::run_scenario(args),
        Commands::Policy(args) => commands::cpf::run_policy(args),
        Commands::Version => {
            println!("cpfp {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
