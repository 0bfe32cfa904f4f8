//! AI Answer Checker Library
//!
//! Regression-test harness for AI-agent services: loads declarative YAML test
//! scenarios, sends each scenario's input to the agent over HTTP, and compares
//! the agent's answer against the expected value. While a test runs, the
//! embedded stub server intercepts the agent's outbound tool calls and answers
//! them deterministically from pre-recorded fixtures.
//!
//! # Components
//!
//! - **Stub engine** ([`stub`]): fixture registry, path-template routing,
//!   fuzzy parameter matching, and the embedded HTTP listener
//! - **Runner** ([`runner`]): test orchestration around the real agent
//! - **Comparison** ([`compare`]): exact / substring / similarity matching
//! - **Reporting** ([`report`]): CSV and JSON result files

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod cli;
pub mod compare;
pub mod config;
pub mod error;
pub mod report;
pub mod retry;
pub mod runner;
pub mod scenario;
pub mod stub;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
