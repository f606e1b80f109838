//! Main module for grammar-kiln functionality

pub mod artifact;
pub mod cache;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod formats;
pub mod grammar;
pub mod loader;
pub mod pipeline;
pub mod resolver;
pub mod runtime;
pub mod session;
pub mod testing;
pub mod workflow;
