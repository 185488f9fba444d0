// ABOUTME: Library module for sql-exec-eval
// ABOUTME: Exports migration, execution, and scoring building blocks

pub mod batch;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod migrate;
pub mod rewrite;
pub mod score;
pub mod source;
pub mod utils;
pub mod value;
