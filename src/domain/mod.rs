//! Domain types of the storefront payment core and the ports it talks to.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod payment;
pub mod ports;
pub mod transaction;
