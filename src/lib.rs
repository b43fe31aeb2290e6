//! Audits commits landing on monitored refs against per-account rulesets
//! and notifies the bug tracker about violations.

pub mod audit;
pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod logging;
pub mod messages;
pub mod model;
pub mod notify;
pub mod output;
pub mod rules;
pub mod store;
