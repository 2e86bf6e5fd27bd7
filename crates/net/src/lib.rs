#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for assetpack
//!
//! This crate handles HTTP downloads with retry logic and the
//! URL-keyed download cache that makes repeated runs idempotent.

mod cache;
mod client;

pub use cache::{cache_key, CachingDownloader};
pub use client::{NetClient, NetConfig};
