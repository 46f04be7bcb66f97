//! # ThoughtSynth
//!
//! A personal knowledge-synthesis service: users submit URLs, the service
//! extracts the page text, asks an LLM for a structured digest, stores the
//! result, and hosts one chat thread per item where people and an AI
//! assistant discuss it. New chat frames are relayed live over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │ Extractor │──▶│ Analyzer  │──▶│  Store   │──▶│   Indexer    │
//! │ classify  │   │ live /    │   │ SQLite / │   │ (optional,   │
//! │ + scrape  │   │ degraded  │   │ memory   │   │  best-effort)│
//! └───────────┘   └───────────┘   └────┬─────┘   └──────────────┘
//!                                      │
//!                      ┌───────────────┤
//!                      ▼               ▼
//!                ┌──────────┐    ┌───────────┐
//!                │   Chat   │    │ HTTP + WS │
//!                │  threads │    │  (axum)   │
//!                └──────────┘    └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! synth init                                # create database
//! synth classify https://youtu.be/xyz       # video
//! synth process https://example.com/post --user u1
//! synth serve                               # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | URL classification and HTML scraping |
//! | [`llm`] | Anthropic Messages API client |
//! | [`analyzer`] | Live / degraded analysis strategies |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | SQLite and Pinecone vector indexes |
//! | [`indexer`] | Best-effort vector index maintenance |
//! | [`chat`] | Per-item chat threads |
//! | [`broadcast`] | WebSocket relay hub |
//! | [`ingest`] | Content ingestion pipeline |
//! | [`app`] | Service wiring |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! Data models, the `Store` trait and the in-memory backends live in the
//! `thoughtsynth-core` crate.

pub mod analyzer;
pub mod app;
pub mod auth;
pub mod broadcast;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
pub mod vector_index;
