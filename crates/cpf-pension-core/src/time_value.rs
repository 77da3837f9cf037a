use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::CpfError;
use crate::types::{Money, Rate};
use crate::CpfResult;

const NPV_TOLERANCE: Decimal = dec!(0.000001);
const DERIVATIVE_FLOOR: Decimal = dec!(0.000000000001);
const MAX_SOLVER_ITERATIONS: u32 = 100;
const ROOT_EPSILON: Decimal = dec!(0.0000000000000000000001);
const MAX_ROOT_ITERATIONS: u32 = 200;

// ---------------------------------------------------------------------------
// Compounding helpers
// ---------------------------------------------------------------------------

/// Compute (1 + r)^n via iterative multiplication (avoids Decimal::powd drift).
///
/// Returns `None` when the power leaves the Decimal range.
pub fn compound(rate: Rate, n: u32) -> Option<Decimal> {
    checked_pow(Decimal::ONE + rate, n)
}

fn checked_pow(base: Decimal, n: u32) -> Option<Decimal> {
    let mut result = Decimal::ONE;
    for _ in 0..n {
        result = result.checked_mul(base)?;
    }
    Some(result)
}

/// Positive n-th root via Newton's method: x_{k+1} = ((n-1)x + v / x^(n-1)) / n.
///
/// The starting point 1 + (v - 1)/n lies above the root (Bernoulli), so the
/// iteration descends monotonically. Roots of values near zero converge
/// slowly; an unconverged root is an error, never a silent approximation.
fn nth_root(value: Decimal, n: u32) -> CpfResult<Decimal> {
    if n <= 1 || value == Decimal::ONE {
        return Ok(value);
    }
    if value <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }

    let n_dec = Decimal::from(n);
    let n_minus_one = Decimal::from(n - 1);
    let mut x = Decimal::ONE + (value - Decimal::ONE) / n_dec;
    let mut delta = x;

    for _ in 0..MAX_ROOT_ITERATIONS {
        let power = checked_pow(x, n - 1).ok_or_else(|| {
            CpfError::invalid("annual_rate", "Rate is too large to convert between periodicities")
        })?;
        let Some(ratio) = value.checked_div(power) else {
            break;
        };
        let next = (n_minus_one * x + ratio) / n_dec;
        delta = (next - x).abs();
        x = next;
        if delta < ROOT_EPSILON * x.max(Decimal::ONE) {
            return Ok(x);
        }
    }

    Err(CpfError::ConvergenceFailure {
        function: format!("{n}-th root of {value}"),
        iterations: MAX_ROOT_ITERATIONS,
        last_delta: delta,
    })
}

/// Convert an effective annual rate into the equivalent per-period rate:
/// (1 + annual)^(1/periods_per_year) - 1.
pub fn periodic_rate(annual_rate: Rate, periods_per_year: u32) -> CpfResult<Rate> {
    if periods_per_year == 0 {
        return Err(CpfError::invalid(
            "periods_per_year",
            "Periods per year must be > 0",
        ));
    }
    if annual_rate <= dec!(-1) {
        return Err(CpfError::invalid(
            "annual_rate",
            "Rate must be greater than -100%",
        ));
    }
    if periods_per_year == 1 {
        return Ok(annual_rate);
    }
    Ok(nth_root(Decimal::ONE + annual_rate, periods_per_year)? - Decimal::ONE)
}

/// Convert a per-period rate into the effective annual rate: (1 + r)^ppy - 1.
pub fn annualize(periodic: Rate, periods_per_year: u32) -> CpfResult<Rate> {
    compound(periodic, periods_per_year)
        .map(|c| c - Decimal::ONE)
        .ok_or_else(|| {
            CpfError::invalid(
                "periods_per_year",
                format!("Annualising {periodic} over {periods_per_year} periods overflows"),
            )
        })
}

// ---------------------------------------------------------------------------
// NPV
// ---------------------------------------------------------------------------

/// Net Present Value of an evenly spaced cash-flow series.
///
/// `annual_rate` is an effective annual rate; it is converted to the series'
/// own periodicity before discounting. Period 0 is undiscounted.
pub fn npv(annual_rate: Rate, cash_flows: &[Money], periods_per_year: u32) -> CpfResult<Money> {
    let rate = periodic_rate(annual_rate, periods_per_year)?;
    periodic_npv(rate, cash_flows)
}

/// NPV at a per-period rate.
pub fn periodic_npv(rate: Rate, cash_flows: &[Money]) -> CpfResult<Money> {
    if rate <= dec!(-1) {
        return Err(CpfError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }

    match npv_and_derivative(cash_flows, rate) {
        Some((value, _)) => Ok(value),
        None => Err(CpfError::DivisionByZero {
            context: format!("NPV discounting at periodic rate {rate} overflowed"),
        }),
    }
}

/// NPV and dNPV/dr at a per-period rate. `None` when the discounting
/// overflows the Decimal range (deeply negative rates over long horizons).
fn npv_and_derivative(cash_flows: &[Money], rate: Rate) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }
    let v = Decimal::ONE.checked_div(one_plus_r)?;

    let mut value = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(v)?;
        }
        let pv = cf.checked_mul(discount)?;
        value = value.checked_add(pv)?;
        if t > 0 {
            // d/dr [cf (1+r)^-t] = -t cf (1+r)^-(t+1)
            let term = Decimal::from(t as u64).checked_mul(pv)?.checked_mul(v)?;
            derivative = derivative.checked_sub(term)?;
        }
    }

    Some((value, derivative))
}

// ---------------------------------------------------------------------------
// IRR
// ---------------------------------------------------------------------------

/// Root-finding strategy for the IRR solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootFinder {
    /// Newton-Raphson, falling back to bisection on a degenerate derivative
    /// or non-convergence.
    #[default]
    NewtonRaphson,
    /// Bisection over the periodic-rate bounds only.
    Bisection,
}

/// Solver parameters. Bounds apply to the per-period rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IrrConfig {
    /// Annualised starting guess.
    pub initial_guess: Rate,
    pub periods_per_year: u32,
    pub tolerance: Decimal,
    pub max_iterations: u32,
    pub lower_bound: Rate,
    pub upper_bound: Rate,
    pub root_finder: RootFinder,
}

impl Default for IrrConfig {
    fn default() -> Self {
        Self {
            initial_guess: dec!(0.03),
            periods_per_year: 12,
            tolerance: NPV_TOLERANCE,
            max_iterations: MAX_SOLVER_ITERATIONS,
            lower_bound: dec!(-0.99),
            upper_bound: dec!(0.50),
            root_finder: RootFinder::NewtonRaphson,
        }
    }
}

impl IrrConfig {
    pub fn with_periods_per_year(periods_per_year: u32) -> Self {
        Self {
            periods_per_year,
            ..Self::default()
        }
    }

    fn validate(&self) -> CpfResult<()> {
        if self.periods_per_year == 0 {
            return Err(CpfError::invalid(
                "periods_per_year",
                "Periods per year must be > 0",
            ));
        }
        if self.lower_bound <= dec!(-1) || self.lower_bound >= self.upper_bound {
            return Err(CpfError::invalid(
                "lower_bound",
                "Bounds must satisfy -1 < lower_bound < upper_bound",
            ));
        }
        if self.tolerance <= Decimal::ZERO {
            return Err(CpfError::invalid("tolerance", "Tolerance must be > 0"));
        }
        if self.max_iterations == 0 {
            return Err(CpfError::invalid(
                "max_iterations",
                "Iteration cap must be > 0",
            ));
        }
        Ok(())
    }
}

/// Why a solve produced (or failed to produce) a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrStatus {
    Converged,
    /// All flows share a sign (or are zero); the IRR is undefined.
    NoSignChange,
    /// The bounds do not bracket a root and Newton did not converge.
    NoBracket,
    NotConverged,
}

/// Outcome of a single IRR solve. `rate` is `None` whenever the IRR is
/// undefined; it is never defaulted to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrSolution {
    /// Annualised IRR.
    pub rate: Option<Rate>,
    pub periodic_rate: Option<Rate>,
    pub status: IrrStatus,
    pub method: Option<RootFinder>,
    pub newton_iterations: u32,
    pub bisection_iterations: u32,
    /// NPV at the returned periodic rate.
    pub residual_npv: Option<Money>,
}

impl IrrSolution {
    fn undefined(status: IrrStatus, newton_iterations: u32, bisection_iterations: u32) -> Self {
        Self {
            rate: None,
            periodic_rate: None,
            status,
            method: None,
            newton_iterations,
            bisection_iterations,
            residual_npv: None,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.rate.is_some()
    }
}

/// IRR plus NPV at a caller-supplied discount rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrResult {
    pub rate: Option<Rate>,
    pub discount_rate: Rate,
    pub npv: Money,
    pub diagnostics: IrrSolution,
}

/// True when the series has at least one strictly negative and one strictly
/// positive flow.
pub fn has_sign_change(cash_flows: &[Money]) -> bool {
    let has_negative = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    let has_positive = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    has_negative && has_positive
}

/// Internal Rate of Return of an evenly spaced series.
///
/// Newton-Raphson runs on the per-period rate, clamped to the configured
/// bounds after each step. Bisection takes over when the derivative is
/// degenerate, when Newton exhausts its iterations, or when selected
/// directly through `RootFinder::Bisection`.
pub fn solve_irr(cash_flows: &[Money], config: &IrrConfig) -> CpfResult<IrrSolution> {
    config.validate()?;

    if !has_sign_change(cash_flows) {
        return Ok(IrrSolution::undefined(IrrStatus::NoSignChange, 0, 0));
    }

    let mut newton_iterations = 0;
    if config.root_finder == RootFinder::NewtonRaphson {
        let guess = periodic_rate(config.initial_guess, config.periods_per_year)?;
        let (found, iterations) = newton_raphson(cash_flows, guess, config);
        newton_iterations = iterations;
        if let Some((periodic, residual)) = found {
            return converged(
                periodic,
                residual,
                RootFinder::NewtonRaphson,
                newton_iterations,
                0,
                config,
            );
        }
    }

    let (outcome, bisection_iterations) = bisection(cash_flows, config);
    match outcome {
        BisectionOutcome::Root(periodic, residual) => converged(
            periodic,
            residual,
            RootFinder::Bisection,
            newton_iterations,
            bisection_iterations,
            config,
        ),
        BisectionOutcome::NoBracket => Ok(IrrSolution::undefined(
            IrrStatus::NoBracket,
            newton_iterations,
            bisection_iterations,
        )),
        BisectionOutcome::Exhausted => Ok(IrrSolution::undefined(
            IrrStatus::NotConverged,
            newton_iterations,
            bisection_iterations,
        )),
    }
}

/// Solve the IRR and evaluate NPV at `annual_discount_rate` in one pass.
pub fn analyze_returns(
    cash_flows: &[Money],
    annual_discount_rate: Rate,
    config: &IrrConfig,
) -> CpfResult<IrrResult> {
    let diagnostics = solve_irr(cash_flows, config)?;
    let npv_value = npv(annual_discount_rate, cash_flows, config.periods_per_year)?;
    Ok(IrrResult {
        rate: diagnostics.rate,
        discount_rate: annual_discount_rate,
        npv: npv_value,
        diagnostics,
    })
}

fn converged(
    periodic: Rate,
    residual: Money,
    method: RootFinder,
    newton_iterations: u32,
    bisection_iterations: u32,
    config: &IrrConfig,
) -> CpfResult<IrrSolution> {
    Ok(IrrSolution {
        rate: Some(annualize(periodic, config.periods_per_year)?),
        periodic_rate: Some(periodic),
        status: IrrStatus::Converged,
        method: Some(method),
        newton_iterations,
        bisection_iterations,
        residual_npv: Some(residual),
    })
}

fn clamp_rate(rate: Rate, config: &IrrConfig) -> Rate {
    rate.max(config.lower_bound).min(config.upper_bound)
}

/// Returns the converged (rate, npv) pair, or `None` when Newton gives up,
/// together with the iterations spent.
fn newton_raphson(
    cash_flows: &[Money],
    guess: Rate,
    config: &IrrConfig,
) -> (Option<(Rate, Money)>, u32) {
    let mut rate = clamp_rate(guess, config);

    for i in 0..config.max_iterations {
        let iteration = i + 1;
        let Some((value, derivative)) = npv_and_derivative(cash_flows, rate) else {
            // Overflow: pull the rate back towards zero and retry
            rate /= dec!(2);
            continue;
        };

        if value.abs() < config.tolerance {
            return (Some((rate, value)), iteration);
        }

        if derivative.abs() < DERIVATIVE_FLOOR {
            return (None, iteration);
        }

        match value.checked_div(derivative) {
            Some(step) => rate = clamp_rate(rate - step, config),
            None => return (None, iteration),
        }
    }

    (None, config.max_iterations)
}

enum BisectionOutcome {
    Root(Rate, Money),
    NoBracket,
    Exhausted,
}

/// Sign of the NPV at `rate`. When discounting overflows, the flow furthest
/// out dominates for negative rates and the nearest one for positive rates.
fn npv_sign(cash_flows: &[Money], rate: Rate) -> (i8, Option<Decimal>) {
    match npv_and_derivative(cash_flows, rate) {
        Some((value, _)) => (sign_of(value), Some(value)),
        None => {
            let dominant = if rate < Decimal::ZERO {
                cash_flows.iter().rev().find(|cf| !cf.is_zero())
            } else {
                cash_flows.iter().find(|cf| !cf.is_zero())
            };
            (dominant.map(|cf| sign_of(*cf)).unwrap_or(0), None)
        }
    }
}

fn sign_of(value: Decimal) -> i8 {
    if value > Decimal::ZERO {
        1
    } else if value < Decimal::ZERO {
        -1
    } else {
        0
    }
}

fn bisection(cash_flows: &[Money], config: &IrrConfig) -> (BisectionOutcome, u32) {
    let mut low = config.lower_bound;
    let mut high = config.upper_bound;

    let (sign_low, value_low) = npv_sign(cash_flows, low);
    if let Some(v) = value_low {
        if v.abs() < config.tolerance {
            return (BisectionOutcome::Root(low, v), 0);
        }
    }
    let (sign_high, value_high) = npv_sign(cash_flows, high);
    if let Some(v) = value_high {
        if v.abs() < config.tolerance {
            return (BisectionOutcome::Root(high, v), 0);
        }
    }
    if sign_low == 0 || sign_high == 0 || sign_low == sign_high {
        return (BisectionOutcome::NoBracket, 0);
    }

    for i in 0..config.max_iterations {
        let mid = (low + high) / dec!(2);
        let (sign_mid, value_mid) = npv_sign(cash_flows, mid);

        if let Some(v) = value_mid {
            if v.abs() < config.tolerance {
                return (BisectionOutcome::Root(mid, v), i + 1);
            }
        }

        if sign_mid == sign_low {
            low = mid;
        } else {
            high = mid;
        }
    }

    (BisectionOutcome::Exhausted, config.max_iterations)
}
