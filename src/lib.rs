//! Litmus-K8s: Kubernetes operators for the Litmus chaos-testing platform
//!
//! One charm per platform component (auth server, backend server,
//! chaoscenter frontend, chaos infrastructure). Each charm derives its
//! workload configuration from the relations it has with the others and
//! reports a single unit status.

pub mod charm;
pub mod config;
pub mod controller;
pub mod error;
pub mod interfaces;
pub mod model;
pub mod runtime;
pub mod telemetry;
pub mod workload;

pub use crate::error::{Error, Result};
