//! Claim submission, eligibility review and bulk import for the academic
//! physician activity programme.

pub mod accounts;
pub mod admin;
pub mod claims;
pub mod config;
pub mod error;
pub mod import;
pub mod telemetry;
