pub mod accounts;
pub mod cache;
pub mod cash_flows;
pub mod payout;
pub mod policy;
pub mod scenario;
pub mod simulation;
