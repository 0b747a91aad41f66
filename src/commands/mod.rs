// ABOUTME: Command module aggregator for the promoter CLI.
// ABOUTME: Re-exports init, promote, status, and rollback command handlers.

mod connect;
mod init;
mod promote;
mod rollback;
mod status;

pub use init::init;
pub use promote::{PromoteOptions, promote};
pub use rollback::rollback;
pub use status::status;

use promoter::config::Config;
use promoter::error::Result;
use std::path::Path;

/// Load the file given with `--config`, or discover one in the working directory.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(&std::env::current_dir()?),
    }
}
