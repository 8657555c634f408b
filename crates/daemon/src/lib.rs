#![deny(unsafe_code)]
#![warn(missing_docs)]

//! mcpforge daemon: synthesizes MCP server artifacts from workflow specs,
//! registers them and supervises their processes.

pub mod config;
pub mod http;
pub mod orchestrator;
pub mod preprocess;
pub mod registry;
mod signal;
pub mod supervisor;
pub mod synth;
pub mod writer;
