//! Prahari - streaming clinical-alerting client
//!
//! Consumes a hospital feed of PAS admission/discharge and LIMS lab-result
//! messages over MLLP-framed TCP, maintains durable per-patient state,
//! derives a fixed-width feature vector per lab result, and pages on
//! positive AKI predictions.
//!
//! Pipeline per frame: [`mllp`] decode → [`hl7`] parse → [`store`] update →
//! [`features`] vector → [`model`] predict → [`pager`] dispatch, driven by
//! the [`session`] controller.

pub mod app;
pub mod config;
pub mod error;
pub mod features;
pub mod hl7;
pub mod metrics;
pub mod mllp;
pub mod model;
pub mod pager;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
