//! Purge command - delete expired entries

use crate::cache::create_facade;
use crate::config::Config;
use crate::error::SkycacheResult;
use console::style;

/// Execute the purge command
pub async fn execute(config: &Config) -> SkycacheResult<()> {
    let facade = create_facade(config).await;
    let removed = facade.purge_expired().await?;

    println!(
        "{} Purged {} expired entr{} from {} backend",
        style("✓").green(),
        removed,
        if removed == 1 { "y" } else { "ies" },
        facade.backend().name()
    );
    Ok(())
}
