// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a promoter.yml template and checks it parses before saving.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::ImageRef;

use super::deserialize::validate_app_name;
use super::{CONFIG_FILENAME, Config};

/// Write a template config into `dir`, returning its path.
pub fn init_config(
    dir: &Path,
    app: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let app = app.unwrap_or("my-app");
    validate_app_name(app).map_err(Error::InvalidConfig)?;

    let image = match image {
        Some(i) => ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => ImageRef::parse(&format!("registry.example.com/{}:latest", app))
            .map_err(|e| Error::InvalidConfig(e.to_string()))?,
    };

    let yaml = generate_template_yaml(app, &image);
    Config::from_yaml(&yaml)?;
    std::fs::write(&config_path, yaml)?;

    Ok(config_path)
}

fn generate_template_yaml(app: &str, image: &ImageRef) -> String {
    format!(
        r#"app: {app}
# The tag is replaced by `promoter promote --tag <build>`.
image: {image}

environments:
  staging:
    # "local", "host", "user@host[:port]", or a map with host/port/user/runtime/socket
    server: deploy@staging.example.com
    port: 8080
    container_port: 3000
    health_url: http://staging.example.com:8080/health
  production:
    server: deploy@prod.example.com
    port: 80
    container_port: 3000
    # Probed with curl from inside the production host.
    health_url: http://localhost:80/health
    health_from: host

health:
  attempts: 30
  interval: 3s
  timeout: 5s

approval:
  timeout: 30m

env:
  RUST_LOG: info
  # DATABASE_URL:
  #   env: DATABASE_URL

stop:
  timeout: 10s
"#
    )
}
