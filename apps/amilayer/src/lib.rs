//! # amilayer
//!
//! Library half of the amilayer binary: command line definitions, settings
//! and the external data envelope. All decisions are made by
//! `amilayer-core`; this crate only moves bytes in and out.

pub mod cli;
pub mod config;
pub mod envelope;
