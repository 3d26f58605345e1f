//! User command - read or write per-user preferences

use crate::cli::args::{UserAction, UserArgs};
use crate::config::Config;
use crate::error::SkycacheResult;
use crate::user::{FileAttributeStore, PerUserStore};
use console::style;
use std::sync::Arc;

/// Execute the user command
pub async fn execute(args: UserArgs, config: &Config) -> SkycacheResult<()> {
    let store = PerUserStore::new(Arc::new(FileAttributeStore::new(config.users.dir())));

    match args.action {
        UserAction::Get { user, field } => match store.get_field(&user, field).await? {
            Some(value) => println!("{}", value),
            None => eprintln!("{} {} is not set", style("!").yellow(), style(field).cyan()),
        },
        UserAction::Set { user, field, value } => {
            store.set_field(&user, field, value).await?;
            println!("{} Set {}", style("✓").green(), style(field).cyan());
        }
    }

    Ok(())
}
