use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use cpf_pension_core::time_value::{self, IrrConfig, RootFinder};

use crate::input;

/// Arguments for IRR calculation
#[derive(Args)]
pub struct IrrArgs {
    /// Path to JSON/YAML file holding an array of cash flows
    #[arg(long)]
    pub input: Option<String>,

    /// Evenly spaced cash flows (comma-separated, e.g. "-1000,-1000,2500")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// Periods per year of the series (1 = annual, 12 = monthly)
    #[arg(long, default_value = "12")]
    pub periods_per_year: u32,

    /// Annualised starting guess
    #[arg(long, default_value = "0.03")]
    pub guess: Decimal,

    /// Discount rate for the accompanying NPV
    #[arg(long, default_value = "0.03")]
    pub discount_rate: Decimal,

    /// Use bisection only instead of Newton-Raphson
    #[arg(long)]
    pub bisection: bool,
}

/// Arguments for NPV calculation
#[derive(Args)]
pub struct NpvArgs {
    /// Path to JSON/YAML file holding an array of cash flows
    #[arg(long)]
    pub input: Option<String>,

    /// Evenly spaced cash flows (comma-separated)
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// Effective annual discount rate
    #[arg(long)]
    pub rate: Decimal,

    /// Periods per year of the series (1 = annual, 12 = monthly)
    #[arg(long, default_value = "12")]
    pub periods_per_year: u32,
}

fn get_cash_flows(
    input_path: &Option<String>,
    cli_flows: &Option<Vec<Decimal>>,
) -> Result<Vec<Decimal>, Box<dyn std::error::Error>> {
    let data = if let Some(ref path) = input_path {
        Some(input::file::read_value(path)?)
    } else if let Some(ref flows) = cli_flows {
        return Ok(flows.clone());
    } else {
        input::stdin::read_stdin()?
    };

    match data {
        Some(Value::Object(map)) => match map.get("cash_flows") {
            Some(flows) => Ok(serde_json::from_value(flows.clone())?),
            None => Err("JSON object must contain a 'cash_flows' array".into()),
        },
        Some(other) => Ok(serde_json::from_value(other)?),
        None => Err("Provide --cash-flows or --input file or pipe JSON via stdin".into()),
    }
}

pub fn run_irr(args: IrrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let flows = get_cash_flows(&args.input, &args.cash_flows)?;
    let config = IrrConfig {
        initial_guess: args.guess,
        root_finder: if args.bisection {
            RootFinder::Bisection
        } else {
            RootFinder::NewtonRaphson
        },
        ..IrrConfig::with_periods_per_year(args.periods_per_year)
    };
    let result = time_value::analyze_returns(&flows, args.discount_rate, &config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_npv(args: NpvArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let flows = get_cash_flows(&args.input, &args.cash_flows)?;
    let value = time_value::npv(args.rate, &flows, args.periods_per_year)?;
    Ok(json!({
        "npv": value,
        "discount_rate": args.rate,
        "periods_per_year": args.periods_per_year,
        "periods": flows.len(),
    }))
}
