//! Environment file loading utilities

use std::path::Path;

use tracing::{debug, warn};

/// Load environment variables from .env files in the application directory.
/// This loads .env first, then .env.{APP_ENV} if APP_ENV is set.
pub fn load_env_files(folder: &Path) {
    load_env_file(folder, ".env", false);

    if let Ok(app_env) = std::env::var("APP_ENV") {
        load_env_file(folder, &format!(".env.{}", app_env), true);
    }
}

/// Load a single .env file
///
/// # Arguments
/// * `folder` - The directory containing the .env file
/// * `filename` - The name of the .env file
/// * `override_existing` - Whether to override existing environment variables
pub fn load_env_file(folder: &Path, filename: &str, override_existing: bool) {
    let env_file = folder.join(filename);
    if !env_file.exists() {
        return;
    }

    let content = match std::fs::read_to_string(&env_file) {
        Ok(content) => content,
        Err(err) => {
            warn!(file = %env_file.display(), %err, "could not read env file");
            return;
        }
    };

    let mut applied = 0;
    for (key, value) in parse_env_file(&content) {
        if override_existing || std::env::var(&key).is_err() {
            std::env::set_var(&key, value);
            applied += 1;
        }
    }
    debug!(file = %env_file.display(), applied, "loaded env file");
}

/// `KEY=value` pairs from .env content. Blank lines and `#` comments are
/// skipped, `export ` prefixes and surrounding quotes are stripped.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
