//! ESPCam Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Standard service trait every ESPCam service implements
//! - Common domain types (DeviceId, epoch-millisecond timestamps)
//! - Error handling utilities
//! - Base configuration loaded from the environment

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::{EspcamError, Result};
pub use service::{
    DependencyStatus, EspcamService, HealthStatus, MicroserviceRuntime, ReadinessStatus,
};
