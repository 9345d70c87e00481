pub mod cache;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod hosting;
pub mod linter;
pub mod logging;
pub mod process;
pub mod processor;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod task;
pub mod ui;
pub mod vcs;

#[cfg(test)]
pub(crate) mod testing;
