//! Core types and trait definitions for Duet.
//!
//! This crate has no HTTP or database dependencies. It defines the
//! primary-store and mirror-store abstractions, the permission gate, and the
//! coercion rules that map canonical records onto the coarser analytical row
//! format.

pub mod access;
pub mod error;
pub mod identity;
pub mod mirror;
pub mod person;
pub mod store;
pub mod team;
pub mod token;

pub use error::{Error, Result};
