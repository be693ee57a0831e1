//! Tiered place-name coverage map: dataset loading, search, classification,
//! legend counts, clustering, tile rendering and JSON exports.

pub mod types;
pub mod config;
pub mod data;
pub mod context;
pub mod search;
pub mod stats;
pub mod layers;
pub mod cluster;
pub mod export;
pub mod render;
pub mod server;
