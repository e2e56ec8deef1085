//! Core library modules for butterfly-scenario
//!
//! This module contains the internal implementation details of the
//! butterfly-scenario library.

pub mod compare;
pub mod dataset;
pub mod env;
pub mod error;
pub mod group;
pub mod pipeline;
pub mod points;
pub mod process;
pub mod query;
pub mod scenario;
pub mod server;
