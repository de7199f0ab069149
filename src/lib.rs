//! Podcast Reader - feed ingestion for a browser podcast player
//!
//! This crate fetches podcast feeds (RSS or Atom), keeps a time-based cache of
//! their raw text in a key-value store, and serves the merged, newest-first
//! episode list to the player page.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod parser;
pub mod reader;
pub mod routes;
pub mod scheduler;
pub mod store;
