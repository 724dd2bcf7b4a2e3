//! Async Rust client library for the Fleet device-management REST API.
//!
//! Provides an authenticated request engine with transparent pagination and
//! a typed error taxonomy, plus a query orchestrator that runs live osquery
//! SQL against hosts and labels and always cleans up after itself.
//!
//! # Modules
//!
//! - [`client`]: `Connection` and the request engine (URL building, paging).
//! - [`params`]: query-string normalization and percent-encoding.
//! - [`classify`]: maps transport failures and HTTP statuses to [`FleetError`].
//! - [`error`]: the crate error type.
//! - [`auth`], [`config`], [`session`]: credentials, settings, and the
//!   connect/disconnect lifecycle.
//! - [`live_query`]: direct saved/ad-hoc runs and the `run_query` dispatcher.
//! - [`campaign`]: fire-and-poll campaigns with a deadline.
//! - [`results`]: per-host result partitioning shared by both run modes.
//! - [`hosts`], [`queries`], [`policies`], [`software`]: resource endpoints.
//!
//! # Quick Start
//!
//! ```ignore
//! use fleet_api::config::FleetConfig;
//! use fleet_api::live_query::run_adhoc_query;
//! use fleet_api::session::Session;
//!
//! let config = FleetConfig::new("https://fleet.example.com").with_api_token("...");
//! let session = Session::new();
//! let conn = session.connect(&config).await?;
//! let result = run_adhoc_query(&conn, "SELECT * FROM os_version;", &[1, 2]).await?;
//! println!("{}% responded", result.response_rate);
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod campaign;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod hosts;
pub mod live_query;
pub mod params;
pub mod policies;
pub mod queries;
pub mod results;
pub mod session;
pub mod software;

pub use error::{FleetError, Result};
