//! Core types and pipeline logic for the Huddle warehouse loader.
//!
//! This crate has no database dependencies. Storage backends implement
//! [`store::Warehouse`]; the pipeline in [`pipeline`] drives any of them
//! through change detection, dimension resolution, fact transformation and
//! strategy-driven persistence.

pub mod audit;
pub mod cache;
pub mod change;
pub mod dimension;
pub mod entity;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod record;
pub mod report;
pub mod row;
pub mod rules;
pub mod store;
pub mod table;
pub mod transform;

pub use error::{Error, Result};
