// mod.rs - Command handlers.
//
// `dispatch` runs the forwarded command; everything else is a one-shot
// action on the watchlist file.

pub mod dispatch;
pub mod watchlist;

use std::path::PathBuf;

use crate::settings::Settings;

/// A one-shot action requested instead of a forwarded command.
pub enum Action {
    Template,
    Init,
    ConfPath,
    CandidateDirs,
    List,
    Watch(PathBuf),
    Unwatch(PathBuf),
    Prune,
}

pub fn execute(action: Action, settings: &Settings) -> anyhow::Result<()> {
    match action {
        Action::Template => watchlist::template(),
        Action::Init => watchlist::init(settings),
        Action::ConfPath => {
            println!("{}", settings.conf_path.display());
            Ok(())
        }
        Action::CandidateDirs => {
            for path in crate::settings::candidate_paths() {
                println!("{}", path.display());
            }
            Ok(())
        }
        Action::List => watchlist::list(settings),
        Action::Watch(path) => watchlist::watch(settings, &path),
        Action::Unwatch(path) => watchlist::unwatch(settings, &path),
        Action::Prune => watchlist::prune(settings),
    }
}
