//! Dotenv-style files named by `PLUGIN_ENV_FILE`.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("unable to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected KEY=VALUE")]
    Syntax { line: usize },
}

/// Parse `KEY=VALUE` lines.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is
/// allowed and matching single or double quotes around the value are
/// removed.
pub fn parse_env_file(content: &str) -> Result<Vec<(String, String)>, EnvFileError> {
    let mut vars = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map_or(line, str::trim_start);
        let (key, value) = line
            .split_once('=')
            .ok_or(EnvFileError::Syntax { line: index + 1 })?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(EnvFileError::Syntax { line: index + 1 });
        }
        vars.push((key.to_string(), unquote(value.trim()).to_string()));
    }
    Ok(vars)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Load `path` into the process environment. Variables that are already
/// set keep their value. Returns how many variables were set.
///
/// Must run before any other thread reads the environment.
pub fn load_env_file(path: &Path) -> Result<usize, EnvFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| EnvFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut loaded = 0;
    for (key, value) in parse_env_file(&content)? {
        if std::env::var_os(&key).is_some() {
            trace!("{} already set, keeping it", key);
            continue;
        }
        std::env::set_var(&key, value);
        loaded += 1;
    }
    Ok(loaded)
}
