#![forbid(unsafe_code)]

//! Scrapes a channel's public video listing through a headless browser and
//! returns canonical channel and video records.

pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod security;
pub mod server;
