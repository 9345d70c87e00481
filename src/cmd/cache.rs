//! Result cache maintenance (`stylesweep cache`).

use anyhow::Result;
use console::style;

use stylesweep::cache::ResultCache;
use stylesweep::ui::format_duration;

use super::super::{CacheCommands, Cli};
use super::load_config;

pub fn cmd_cache(cli: &Cli, command: CacheCommands) -> Result<()> {
    let config = load_config(cli)?;
    let cache = ResultCache::open(config.cache_dir());

    match command {
        CacheCommands::Stats => {
            let stats = cache.stats();
            println!();
            println!("Result cache: {}", cache.path().display());
            println!();
            println!("  entries          {}", style(cache.len()).bold());
            println!("  hits             {}", style(stats.hits).green());
            println!("  misses           {}", stats.misses);
            println!("  updates          {}", stats.updates);
            println!("  hit rate         {:.1}%", stats.hit_rate());
            println!(
                "  avg duration     {}",
                format_duration(std::time::Duration::from_secs_f64(cache.average_duration()))
            );
            println!(
                "  time saved       {}",
                style(format_duration(std::time::Duration::from_secs_f64(
                    stats.time_saved_secs.max(0.0)
                )))
                .cyan()
            );
            println!();
        }
        CacheCommands::List => {
            let names = cache.names();
            if names.is_empty() {
                println!("Result cache is empty.");
                return Ok(());
            }
            for name in names {
                if let Some(entry) = cache.get(&name) {
                    let short: String = entry.commit_fingerprint.chars().take(7).collect();
                    let state = if entry.had_issues {
                        style("issues").yellow()
                    } else {
                        style("clean").green()
                    };
                    println!(
                        "  {} {} {} {}",
                        name,
                        style(short).dim(),
                        state,
                        style(entry.recorded_at.format("%Y-%m-%d %H:%M")).dim()
                    );
                }
            }
        }
        CacheCommands::Clear => {
            let count = cache.len();
            cache.invalidate_all()?;
            println!("Cleared {} cached result(s).", count);
        }
        CacheCommands::Invalidate { repo } => {
            if cache.get(&repo).is_none() {
                println!("No cached result for {}.", repo);
                return Ok(());
            }
            cache.invalidate(&repo)?;
            println!("Invalidated cached result for {}.", repo);
        }
    }

    Ok(())
}
