//! Backend source parsing.
//!
//! The source is line-oriented text with one backend per line and fields
//! separated by `:`:
//!
//! ```text
//! a.example            # host, weight 1
//! a.example:3          # host:weight
//! 10.0.0.7:8080:5      # host:port:weight
//! ```
//!
//! Parsing is best effort. Blank lines and lines without a usable host are
//! skipped so one bad line never prevents a load. A weight that is missing,
//! non-numeric or not positive becomes 1.

use std::io;
use std::path::{Path, PathBuf};

use url::Url;

use crate::load_balancer::backend::Backend;

/// Error returned when a backend source cannot be loaded.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("backend source {path:?} unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read and parse the backend source at `path`.
pub async fn read_backends(path: &Path) -> Result<Vec<Backend>, LoadError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parse_backends(&content))
}

/// Parse backend source text. Never fails; malformed lines are dropped.
pub fn parse_backends(content: &str) -> Vec<Backend> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let backend = parse_line(line);
            if backend.is_none() && !line.trim().is_empty() {
                tracing::debug!(line = idx + 1, content = %line, "Skipping malformed backend line");
            }
            backend
        })
        .collect()
}

fn parse_line(line: &str) -> Option<Backend> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let fields: Vec<&str> = line.splitn(3, ':').map(str::trim).collect();
    let (host, weight) = match fields.as_slice() {
        [host] => ((*host).to_string(), None),
        [host, weight] => ((*host).to_string(), Some(*weight)),
        [_, "", _] => return None,
        [host, port, weight] => (format!("{host}:{port}"), Some(*weight)),
        _ => return None,
    };

    if fields[0].is_empty() || !is_valid_authority(&host) {
        return None;
    }

    Some(Backend::new(host, parse_weight(weight)))
}

fn parse_weight(field: Option<&str>) -> u32 {
    field
        .and_then(|w| w.parse::<u32>().ok())
        .filter(|w| *w > 0)
        .unwrap_or(1)
}

fn is_valid_authority(host: &str) -> bool {
    Url::parse(&format!("http://{host}/"))
        .map(|url| url.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}
