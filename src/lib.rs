//! Admin operations for the digital-signage backend: asset reference
//! reconciliation, the settings migrator and asset upload tooling.
pub mod cli;
pub mod config;
pub mod error;
pub mod migrate;
pub mod normalization;
pub mod reconcile;
pub mod store;
pub mod telemetry;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use error::{OpsError, OpsResult};
