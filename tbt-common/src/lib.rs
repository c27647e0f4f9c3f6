//! # TBT Common Library
//!
//! Shared code for the TB triage portal services:
//! - Patient and upload document models
//! - Deterministic task naming
//! - Pure risk scoring
//! - Error types
//! - Client configuration resolution

pub mod config;
pub mod error;
pub mod models;
pub mod risk;

pub use error::{Error, Result};
pub use models::{task_name, PatientRecord, UploadRecord, SENTINEL_PATIENT_ID};
