//! Entry commands - get, put and remove shared cache entries

use crate::cache::{create_facade, CacheKey};
use crate::cli::args::{KeyArgs, PutArgs};
use crate::config::Config;
use crate::error::SkycacheResult;
use console::style;

/// Execute the get command
pub async fn get(args: KeyArgs, config: &Config) -> SkycacheResult<()> {
    let key = CacheKey::new(args.namespace, &args.id)?;
    let facade = create_facade(config).await;

    match facade.get(args.namespace, &args.id).await? {
        Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
        None => eprintln!(
            "{} No cached entry for {}",
            style("!").yellow(),
            style(&key).cyan()
        ),
    }

    Ok(())
}

/// Execute the put command
pub async fn put(args: PutArgs, config: &Config) -> SkycacheResult<()> {
    let key = CacheKey::new(args.key.namespace, &args.key.id)?;
    let facade = create_facade(config).await;

    facade
        .put(args.key.namespace, &args.key.id, args.payload, args.ttl)
        .await?;

    println!(
        "{} Cached {} ({} backend)",
        style("✓").green(),
        style(&key).cyan(),
        facade.backend().name()
    );
    Ok(())
}

/// Execute the remove command
pub async fn remove(args: KeyArgs, config: &Config) -> SkycacheResult<()> {
    let key = CacheKey::new(args.namespace, &args.id)?;
    let facade = create_facade(config).await;

    facade.invalidate(args.namespace, &args.id).await?;

    println!("{} Removed {}", style("✓").green(), style(&key).cyan());
    Ok(())
}
