//! # ThoughtSynth Core
//!
//! Shared, runtime-free logic for ThoughtSynth: data models, the store
//! abstraction, the vector index abstraction, analysis parsing, and
//! vector utilities.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. The
//! `thoughtsynth` app crate supplies the SQLite store, the network-backed
//! vector indexes, and the provider clients.

pub mod analysis;
pub mod embedding;
pub mod models;
pub mod store;
pub mod vector;
