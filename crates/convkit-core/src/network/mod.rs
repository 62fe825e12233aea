//! HTTP access to the remote weight store.

mod client;
mod download;

pub use client::{extract_domain, HttpClient};
pub use download::HttpFetcher;
