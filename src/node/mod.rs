//! Storage node server
//!
//! A node owns one local store (sled by default) and exposes the storage
//! adapter contract over HTTP so a remote coordinator can:
//! - read and upsert the term record
//! - list, bulk-replace, insert and update application records
//! - probe liveness

pub mod http;
pub mod server;

pub use server::NodeServer;
