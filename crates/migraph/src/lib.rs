#![forbid(unsafe_code)]

//! Structural extraction of Java sources and a dependency graph over the
//! extracted elements, for planning incremental migrations.

pub mod config;
pub mod context;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod knowledge;
pub mod resolution;
pub mod types;

pub use error::{Error, Result};
pub use extraction::{Extractor, extract_file, extract_project};
pub use graph::DependencyGraph;
pub use resolution::{DependencyResolver, TextualResolver};
