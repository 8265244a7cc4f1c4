#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod crawl;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod frontier;
pub mod html;
pub mod language;
pub mod links;
pub mod logging;
pub mod normalize;
pub mod openai;
pub mod quality;
pub mod render;
pub mod report;
pub mod scorer;
pub mod variants;
