// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # CLI Commands
//!
//! This module contains all CLI subcommands for the integration auditor.
//!
//! ## Command Categories
//!
//! - **Pipeline**: `audit` (detect only), `fix` (detect, plan, execute)
//! - **Operations**: `status`, `state` (show/cleanup/export/import/reset)
//! - **Configuration**: `config` (show/validate), `products`, `business-rules`

pub mod audit;
pub mod business_rules;
pub mod config;
pub mod fix;
pub mod products;
pub mod state;
pub mod status;
