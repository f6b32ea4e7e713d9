//! Tourism warehouse module - batch pipeline from raw extracts to a star schema

pub mod aggregate;
pub mod config;
pub mod dimension;
pub mod error;
pub mod extract;
pub mod mapping;
pub mod normalize;
pub mod parse;
pub mod resolve;
pub mod store;
pub mod transform;
pub mod types;
pub mod write;

pub use error::EtlError;
pub use types::*;
