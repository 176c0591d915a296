use anyhow::{bail, Result};
use radar_config::RadarConfig;
use tracing::info;

use super::open_cursor_store;

pub fn show(cfg: &RadarConfig) -> Result<()> {
    let store = open_cursor_store(cfg)?;
    let cursor = store.current()?;
    println!("path={}", cfg.cursor.path);
    println!("key={}", store.key());
    println!("cursor={cursor}");
    Ok(())
}

pub fn reset(cfg: &RadarConfig, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "refusing to reset cursor '{}' in {} without --yes: every record still in the \
             store's freshness window would be delivered again",
            cfg.cursor.key,
            cfg.cursor.path
        );
    }

    let store = open_cursor_store(cfg)?;
    let previous = store.current()?;
    store.reset()?;
    info!(key = %store.key(), previous = %previous, "cursor/reset");
    println!("cursor_reset key={} previous={previous}", store.key());
    Ok(())
}
