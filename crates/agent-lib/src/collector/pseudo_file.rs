//! Pseudo-file parsing
//!
//! cgroup accounting files are plain text with one `key value` pair per
//! line. A missing file is not an error: the controller may simply not be
//! mounted for a given container.

use crate::error::ParseError;
use crate::models::Sample;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Parse `key value` lines into a sample
///
/// Blank lines are skipped. Any other line that does not carry an unsigned
/// integer value fails the whole read.
pub fn parse_key_values(path: &Path, content: &str) -> Result<Sample, ParseError> {
    let mut sample = Sample::new();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else {
            continue;
        };
        let value = parts
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| ParseError::malformed(path, line))?;

        sample.insert(key.to_string(), value);
    }

    Ok(sample)
}

/// Read a pseudo-file, returning `None` when it does not exist
async fn read_optional(path: &Path) -> Result<Option<String>, ParseError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "Pseudo file not found, ignoring");
            Ok(None)
        }
        Err(source) => Err(ParseError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse a `key value` pseudo-file; an absent file yields an empty sample
pub async fn parse_pseudo_file(path: &Path) -> Result<Sample, ParseError> {
    match read_optional(path).await? {
        Some(content) => parse_key_values(path, &content),
        None => Ok(Sample::new()),
    }
}

/// Read a file holding a single value, trimmed
pub async fn parse_single_value(path: &Path, default: &str) -> Result<String, ParseError> {
    Ok(read_optional(path)
        .await?
        .map(|content| content.trim().to_string())
        .unwrap_or_else(|| default.to_string()))
}

/// Read a pseudo-file as raw lines; absent yields no lines
pub(crate) async fn read_lines(path: &Path) -> Result<Vec<String>, ParseError> {
    Ok(read_optional(path)
        .await?
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_key_values() {
        let content = "user 4200\nsystem 1300\n";
        let sample = parse_key_values(Path::new("cpuacct.stat"), content).unwrap();

        assert_eq!(sample.len(), 2);
        assert_eq!(sample.get("user"), Some(&4200));
        assert_eq!(sample.get("system"), Some(&1300));
    }

    #[test]
    fn test_parse_is_order_independent() {
        let forward = "cache 100\nrss 50\nswap 0\n";
        let reversed = "swap 0\nrss 50\ncache 100\n";

        let a = parse_key_values(Path::new("a"), forward).unwrap();
        let b = parse_key_values(Path::new("b"), reversed).unwrap();
        assert_eq!(a, b);

        // Re-serializing reproduces the same pairs
        let mut lines: Vec<String> = a.iter().map(|(k, v)| format!("{} {}", k, v)).collect();
        lines.sort();
        let mut expected: Vec<&str> = forward.lines().collect();
        expected.sort();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let sample = parse_key_values(Path::new("x"), "\nnr_periods 10\n\n").unwrap();
        assert_eq!(sample.get("nr_periods"), Some(&10));
    }

    #[test]
    fn test_parse_rejects_non_numeric_value() {
        let err = parse_key_values(Path::new("memory.stat"), "cache lots\n").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_value() {
        let err = parse_key_values(Path::new("memory.stat"), "cache\n").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let sample = parse_pseudo_file(&temp_dir.path().join("cpu.stat"))
            .await
            .unwrap();
        assert!(sample.is_empty());
    }

    #[tokio::test]
    async fn test_single_value_default_and_trim() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.limit_in_bytes");

        assert_eq!(parse_single_value(&path, "0").await.unwrap(), "0");

        fs::write(&path, "  536870912\n").await.unwrap();
        assert_eq!(parse_single_value(&path, "0").await.unwrap(), "536870912");
    }
}
