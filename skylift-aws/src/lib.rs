//! Skylift AWS
//!
//! Composers for the site stack: S3 hosting behind CloudFront with an
//! edge rewriter, DNS aliases, deployment users and an ECS/Fargate API.

pub mod backend;
pub mod cdn;
pub mod certificate;
pub mod config;
pub mod dns;
pub mod edge;
pub mod error;
pub mod hosting;
pub mod iam;
pub mod lookups;
pub mod rewriter;
pub mod schemas;
pub mod site;

pub use error::ComposeError;
pub use site::{Site, compose_graph, compose_site, verify_bucket_isolation};
