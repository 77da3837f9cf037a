use napi::Result as NapiResult;
use napi_derive::napi;
use rust_decimal::Decimal;
use serde::Deserialize;

use cpf_pension_core::time_value::{self, IrrConfig};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// CPF
// ---------------------------------------------------------------------------

#[napi]
pub fn evaluate_scenario(input_json: String) -> NapiResult<String> {
    let input: cpf_pension_core::cpf::scenario::PensionScenarioInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        cpf_pension_core::cpf::scenario::evaluate_scenario(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn simulate_contributions(input_json: String) -> NapiResult<String> {
    let input: cpf_pension_core::cpf::simulation::SimulationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = cpf_pension_core::cpf::simulation::simulate_contributions(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn compute_payout(input_json: String) -> NapiResult<String> {
    let input: cpf_pension_core::cpf::payout::PayoutInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        cpf_pension_core::cpf::payout::compute_monthly_payout(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Time value
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct IrrRequest {
    cash_flows: Vec<Decimal>,
    #[serde(default)]
    discount_rate: Option<Decimal>,
    #[serde(default)]
    config: Option<IrrConfig>,
}

#[derive(Deserialize)]
struct NpvRequest {
    cash_flows: Vec<Decimal>,
    rate: Decimal,
    #[serde(default = "default_periods_per_year")]
    periods_per_year: u32,
}

fn default_periods_per_year() -> u32 {
    12
}

#[napi]
pub fn solve_irr(input_json: String) -> NapiResult<String> {
    let request: IrrRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let config = request.config.unwrap_or_default();
    let output = match request.discount_rate {
        Some(rate) => {
            let result = time_value::analyze_returns(&request.cash_flows, rate, &config)
                .map_err(to_napi_error)?;
            serde_json::to_string(&result)
        }
        None => {
            let solution =
                time_value::solve_irr(&request.cash_flows, &config).map_err(to_napi_error)?;
            serde_json::to_string(&solution)
        }
    };
    output.map_err(to_napi_error)
}

#[napi]
pub fn compute_npv(input_json: String) -> NapiResult<String> {
    let request: NpvRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let value = time_value::npv(request.rate, &request.cash_flows, request.periods_per_year)
        .map_err(to_napi_error)?;
    serde_json::to_string(&serde_json::json!({
        "npv": value,
        "discount_rate": request.rate,
        "periods_per_year": request.periods_per_year,
    }))
    .map_err(to_napi_error)
}
