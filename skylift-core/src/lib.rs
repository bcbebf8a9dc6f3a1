//! Skylift Core
//!
//! Resource model, dependency graph and program rendering for composing
//! static sites and container backends on AWS

pub mod case_convert;
pub mod engine;
pub mod graph;
pub mod lookup;
pub mod policy;
pub mod program;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod stack;
