use super::ConfigStore;
use crate::error::{DmError, Result};
use std::path::{Path, PathBuf};

/// odbc.ini on disk. Re-read on every query so edits are picked up by the
/// next enumeration.
#[derive(Debug, Clone)]
pub struct IniFileStore {
    path: PathBuf,
}

impl IniFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes that are not UTF-8 are replaced rather than failing the read.
    fn read(&self) -> Result<String> {
        std::fs::read(&self.path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| {
                log::debug!("Cannot read {}: {}", self.path.display(), e);
                DmError::StoreUnreadable(self.path.display().to_string())
            })
    }
}

/// Header text after `[` up to the first `]`.
fn section_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('[')?;
    let rest = rest.trim_end_matches(['\r', '\n']);
    Some(rest.split(']').next().unwrap_or(rest))
}

fn is_comment(line: &str) -> bool {
    matches!(line.chars().next(), Some(';') | Some('#'))
}

pub(crate) fn parse_section_names(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(section_header)
        .map(str::to_string)
        .collect()
}

pub(crate) fn lookup(contents: &str, section: &str, key: &str) -> Option<String> {
    let mut in_section = false;
    for line in contents.lines() {
        if let Some(header) = section_header(line) {
            if in_section {
                return None;
            }
            in_section = header.trim().eq_ignore_ascii_case(section);
            continue;
        }
        let line = line.trim();
        if !in_section || line.is_empty() || is_comment(line) {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim().eq_ignore_ascii_case(key) {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

impl ConfigStore for IniFileStore {
    fn section_names(&self) -> Result<Vec<String>> {
        Ok(parse_section_names(&self.read()?))
    }

    fn attribute(&self, section: &str, key: &str) -> Option<String> {
        let contents = self.read().ok()?;
        lookup(&contents, section, key)
    }
}
