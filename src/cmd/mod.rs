//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `cache`  | `Cache`          |
//! | `config` | `Config`         |

pub mod cache;
pub mod config;
pub mod run;

pub use cache::cmd_cache;
pub use config::cmd_config;
pub use run::cmd_run;

use anyhow::Result;
use stylesweep::config::SweepConfig;

use super::Cli;

/// File and environment layers; CLI overrides are applied by the caller.
pub fn load_config(cli: &Cli) -> Result<SweepConfig> {
    SweepConfig::load(cli.config.as_deref())
}
