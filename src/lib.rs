//! Pending-payment lifecycle and balance ledger for a chat storefront.
//!
//! Users pay from an internal balance or externally with a screenshot as
//! proof. Admins approve or reject each payment exactly once, while payments
//! without proof expire after a fixed window.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
