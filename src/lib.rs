//! EAD Platform Ops Library
//!
//! Operational tooling for the EAD course platform: read-only database
//! diagnostics, transactional data patches, Redis maintenance and HTTP smoke
//! tests against a running API.
//!
//! # Modules
//!
//! - `api_client`: Client for the platform REST API.
//! - `cache`: Redis flush and pattern deletes.
//! - `config`: Configuration from the environment.
//! - `db`: Database connection.
//! - `errors`: Error handling types.
//! - `fmt`: pt-BR formatting for reports.
//! - `inspect`: Read-only diagnostics.
//! - `models`: Row types of the platform schema.
//! - `patch`: Transactional data fixes.
//! - `report`: Text/JSON report output.
//! - `smoke`: HTTP smoke checks.
//! - `validate`: Input validation.

pub mod api_client;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod fmt;
pub mod inspect;
pub mod models;
pub mod patch;
pub mod report;
pub mod smoke;
pub mod validate;
