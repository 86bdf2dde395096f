//! Strom -- Usage-Gated Conversational Session Client
//!
//! A chat client that meters exchanges per identity and gates further
//! usage behind sign-in or an on-chain micropayment once the free quota
//! is exhausted.

pub mod agent;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;
pub mod store;
pub mod types;
