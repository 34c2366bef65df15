//! setup-rocq - Rocq prover setup for CI runners
//!
//! Installs opam, creates an OCaml switch and installs a chosen Rocq
//! version, caching the result between runs.

pub mod cache;
pub mod ci;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod fsutil;
pub mod opam;
pub mod platform;
pub mod process;
pub mod rocq;
pub mod system;

pub use error::{SetupError, SetupResult};
