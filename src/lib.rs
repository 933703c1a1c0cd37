#![forbid(unsafe_code)]

pub mod archive;
pub mod browse;
pub mod catalog;
pub mod cli;
pub mod content;
pub mod error;
pub mod formats;
pub mod logging;
pub mod manifest;
pub mod package;
pub mod read;
pub mod reader;
pub mod search;
pub mod store;
pub mod text;
pub mod xml;
