//! Identity Module
//!
//! Identity resolution from durable storage and the local wallet that
//! backs the payment gate's signer capability.

pub mod resolver;
pub mod wallet;
