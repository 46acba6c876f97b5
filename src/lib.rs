//! Order intake, department workflow, payments and reporting for a print shop.

pub mod commands;
pub mod config;
pub mod error;
pub mod notify;
pub mod order;
pub mod permissions;
pub mod reports;
pub mod service;
pub mod sheets;
pub mod store;
pub mod user;
pub mod utils;
pub mod workflow;
