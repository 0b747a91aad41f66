// ABOUTME: Init command implementation.
// ABOUTME: Scaffolds promoter.yml in the current directory.

use promoter::config::init_config;
use promoter::error::Result;
use promoter::output::Output;
use std::env;

pub fn init(app: Option<&str>, image: Option<&str>, force: bool, output: Output) -> Result<i32> {
    let cwd = env::current_dir()?;
    let path = init_config(&cwd, app, image, force)?;
    output.success(&format!("Created {}", path.display()));
    Ok(0)
}
