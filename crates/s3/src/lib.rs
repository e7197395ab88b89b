//! vcp-s3: S3 adapter for the vcp blob copier
//!
//! This crate provides the implementation of the CloudBackend trait
//! using the aws-sdk-s3 crate. It is the only crate that directly
//! depends on the AWS SDK.

pub mod client;
pub mod multipart;

pub use client::{S3Backend, S3Settings};
