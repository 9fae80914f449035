// watchlist.rs - Inspect and edit the watchlist file.

use std::path::Path;

use anyhow::Context;
use gits_watchlist::Watchlist;

use crate::settings::Settings;

pub fn template() -> anyhow::Result<()> {
    print!("{}", Watchlist::template().to_json()?);
    Ok(())
}

pub fn init(settings: &Settings) -> anyhow::Result<()> {
    let path = &settings.conf_path;
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    Watchlist::template()
        .save(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    println!("created {}", path.display());
    Ok(())
}

pub fn list(settings: &Settings) -> anyhow::Result<()> {
    let watchlist = load(settings)?;
    println!("conf:[{}]\n{}", settings.conf_path.display(), watchlist);
    Ok(())
}

pub fn watch(settings: &Settings, repo: &Path) -> anyhow::Result<()> {
    let path = &settings.conf_path;
    let mut watchlist = Watchlist::load_or_default(path)?;
    let name = watchlist
        .watch(repo)
        .with_context(|| format!("cannot watch {}", repo.display()))?;
    watchlist.save(path)?;

    println!("conf:[{}]\n{}", path.display(), watchlist);
    println!("appended [{}] in [{}]", name, path.display());
    Ok(())
}

pub fn unwatch(settings: &Settings, repo: &Path) -> anyhow::Result<()> {
    let path = &settings.conf_path;
    let mut watchlist = load(settings)?;
    let name = watchlist.unwatch(repo)?;
    watchlist.save(path)?;

    println!("conf:[{}]\n{}", path.display(), watchlist);
    println!("removed [{}] in [{}]", name, path.display());
    Ok(())
}

pub fn prune(settings: &Settings) -> anyhow::Result<()> {
    let path = &settings.conf_path;
    let mut watchlist = load(settings)?;
    let removed = watchlist.prune();
    if removed.is_empty() {
        println!("nothing to prune in [{}]", path.display());
        return Ok(());
    }
    watchlist.save(path)?;

    for name in &removed {
        println!("pruned [{}]", name);
    }
    Ok(())
}

/// Load the configured watchlist; a missing or broken file is an error here.
pub fn load(settings: &Settings) -> anyhow::Result<Watchlist> {
    Watchlist::load(&settings.conf_path)
        .with_context(|| format!("failed to read watchlist {}", settings.conf_path.display()))
}
