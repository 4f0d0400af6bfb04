//! Route handlers, one module per resource.

pub mod capture;
pub mod persons;
pub mod teams;
