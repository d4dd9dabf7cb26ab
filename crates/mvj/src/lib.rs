//! Land-lease administration: leases and their land hierarchy, rents, invoicing and
//! credit notes, dynamic forms, plot searches, and credit-bureau decisions.

#[macro_use]
mod macros;

pub mod auth;
pub mod config;
pub mod credit_integration;
pub mod error;
pub mod forms;
pub mod http;
pub mod leasing;
pub mod money;
pub mod plotsearch;
pub mod store;
pub mod telemetry;
