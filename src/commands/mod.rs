// ABOUTME: Subcommand entry points for the CLI
// ABOUTME: run migrates and executes a batch; score compares result files

pub mod run;
pub mod score;
