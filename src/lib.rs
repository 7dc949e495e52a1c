//! # DataLab provisioning
//!
//! Runs provisioning containers on behalf of self-service and reports what
//! they did.
//!
//! A request goes through four stages:
//!
//! 1. [`command`] renders it into `echo '<json>' | docker run ... --action <a>`
//! 2. [`listener`] registers for the response file the container will write
//! 3. [`executor`] runs the command (or, in mock mode, fakes the container)
//! 4. [`callback`] turns the response file into a status update and posts it
//!    to self-service
//!
//! [`service::ProvisioningService`] wires these together.
//!
//! ## Modules
//!
//! - `app` - Logging setup and fatal error handling for the binary
//! - `callback` - Response handlers and the self-service HTTP client
//! - `command` - Command builder, redaction and the mock command parser
//! - `config` - TOML and environment configuration
//! - `executor` - Shell and mock command executors with a process table
//! - `listener` - Folder listener matching response files to request ids
//! - `model` - Actions, resource types, statuses and request payloads
//! - `service` - Request submission tying the stages together
//! - `subprocess` - Process runner abstraction used by the shell executor

pub mod app;
pub mod callback;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod listener;
pub mod model;
pub mod service;
pub mod subprocess;

pub use error::{Error, Result};
