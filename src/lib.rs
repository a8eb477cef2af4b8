//! nimbus-core: a namespaced virtual filesystem over an object store, with
//! content-hash-keyed dedup, EXIF extraction, thumbnailing, and
//! cross-namespace sharing via mount points.
//!
//! See [`core`] for the transactional heart ([`core::FileCore`]) and
//! [`file_service`] for the mount-aware facade most callers should use.

pub mod cache;
pub mod concurrently;
pub mod config;
pub mod content;
pub mod core;
pub mod counters;
pub mod db;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod file_service;
pub mod file_util;
pub mod hashing;
pub mod mediatype;
pub mod mount_resolver;
pub mod namespace_usecase;
pub mod object_store;
pub mod path;
pub mod repository;
pub mod sharing;
pub mod worker;
