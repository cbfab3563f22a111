mod campaign_flows;
mod cash_issuance;
mod config_loading;
mod scheduling;
