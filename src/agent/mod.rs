//! Remote Agent Module
//!
//! HTTP client for the strom agent backend: conversation exchanges,
//! identity verification, and payment confirmation.

pub mod client;

pub use client::StromHttpClient;
