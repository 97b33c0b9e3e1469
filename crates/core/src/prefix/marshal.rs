//! Text format of prefix files.
//!
//! ```text
//! ## repository-prefixes/2.0
//! # optional comments
//! /org/apache
//! /com/example
//! ```
//!
//! A body consisting of the [`UNSUPPORTED_SENTINEL`] line marks the owner as
//! opted out of routing.

use crate::error::{Result, RoutingError};
use autoroute_api::PrefixList;
use std::collections::HashSet;

pub const MAGIC: &str = "## repository-prefixes/2.0";
pub const UNSUPPORTED_SENTINEL: &str = "@ unsupported";
pub const CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMarshaller {
    max_entries: usize,
    max_line_length: usize,
}

impl TextMarshaller {
    pub fn new(max_entries: usize, max_line_length: usize) -> Self {
        Self {
            max_entries,
            max_line_length,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn marshal(&self, list: &PrefixList) -> Vec<u8> {
        let mut out = String::with_capacity(64 + list.entries.len() * 32);
        out.push_str(MAGIC);
        out.push('\n');
        if !list.supported {
            out.push_str(UNSUPPORTED_SENTINEL);
            out.push('\n');
            return out.into_bytes();
        }
        out.push_str("# Prefix file generated by automatic routing, do not edit\n");
        for entry in &list.entries {
            out.push_str(entry);
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Decodes prefix file content. Limit overflows and malformed content are
    /// `InvalidInput`, never silently truncated.
    pub fn unmarshal(&self, bytes: &[u8]) -> Result<PrefixList> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RoutingError::InvalidInput(format!("prefix file is not UTF-8: {e}")))?;

        let mut lines = text.lines();
        match lines.next().map(str::trim) {
            Some(MAGIC) => {}
            _ => {
                return Err(RoutingError::InvalidInput(format!(
                    "prefix file does not start with '{MAGIC}'"
                )));
            }
        }

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        let mut count = 0usize;
        for (idx, raw) in lines.enumerate() {
            if raw.len() > self.max_line_length {
                return Err(RoutingError::InvalidInput(format!(
                    "prefix file line {} exceeds {} characters",
                    idx + 2,
                    self.max_line_length
                )));
            }
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line == UNSUPPORTED_SENTINEL {
                return Ok(PrefixList::unsupported());
            }
            if line.starts_with('@') {
                return Err(RoutingError::InvalidInput(format!(
                    "unknown prefix file directive '{line}'"
                )));
            }
            // The limit applies to entry lines as read, duplicates included.
            count += 1;
            if count > self.max_entries {
                return Err(RoutingError::InvalidInput(format!(
                    "prefix file has more than {} entries",
                    self.max_entries
                )));
            }
            let entry = if line.starts_with('/') {
                line.to_string()
            } else {
                format!("/{line}")
            };
            if seen.insert(entry.clone()) {
                entries.push(entry);
            }
        }
        Ok(PrefixList::supported(entries))
    }
}

impl Default for TextMarshaller {
    fn default() -> Self {
        Self::new(10_000, 250)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_marshalled_list_reads_back_in_order() {
        let m = TextMarshaller::default();
        let list = PrefixList::supported(entries(&["/org/apache", "/com", "/net/sf"]));
        let decoded = m.unmarshal(&m.marshal(&list)).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn test_unsupported_sentinel() {
        let m = TextMarshaller::default();
        let bytes = m.marshal(&PrefixList::unsupported());
        assert!(String::from_utf8_lossy(&bytes).contains(UNSUPPORTED_SENTINEL));
        let decoded = m.unmarshal(&bytes).unwrap();
        assert!(!decoded.supported);
        assert!(decoded.entries.is_empty());
    }

    #[test]
    fn test_comments_blank_lines_and_missing_slash() {
        let m = TextMarshaller::default();
        let text = format!("{MAGIC}\n# comment\n\n  org/apache  \n/com\n/com\n");
        let decoded = m.unmarshal(text.as_bytes()).unwrap();
        assert_eq!(decoded.entries, entries(&["/org/apache", "/com"]));
    }

    #[test]
    fn test_missing_magic_is_invalid() {
        let m = TextMarshaller::default();
        let err = m.unmarshal(b"/org/apache\n").unwrap_err();
        assert!(matches!(err, RoutingError::InvalidInput(_)));
        assert!(m.unmarshal(b"").is_err());
    }

    #[test]
    fn test_too_many_entries_is_invalid() {
        let m = TextMarshaller::default();
        let mut text = format!("{MAGIC}\n");
        for i in 0..10_001 {
            text.push_str(&format!("/p{i}\n"));
        }
        let err = m.unmarshal(text.as_bytes()).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidInput(_)));

        let exact: String = (0..10_000).map(|i| format!("/p{i}\n")).collect();
        let ok = m.unmarshal(format!("{MAGIC}\n{exact}").as_bytes()).unwrap();
        assert_eq!(ok.len(), 10_000);
    }

    #[test]
    fn test_duplicate_lines_count_towards_entry_limit() {
        let m = TextMarshaller::default();
        let text = format!("{MAGIC}\n{}", "/org/apache\n".repeat(10_001));
        let err = m.unmarshal(text.as_bytes()).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidInput(_)));

        let small = TextMarshaller::new(3, 250);
        let ok = small
            .unmarshal(format!("{MAGIC}\n/a\n/a\n# comment\n/b\n").as_bytes())
            .unwrap();
        assert_eq!(ok.entries, entries(&["/a", "/b"]));
        assert!(small
            .unmarshal(format!("{MAGIC}\n/a\n/a\n/b\n/b\n").as_bytes())
            .is_err());
    }

    #[test]
    fn test_overlong_line_is_invalid() {
        let m = TextMarshaller::new(10, 20);
        let text = format!("{MAGIC}\n/{}\n", "a".repeat(40));
        assert!(matches!(
            m.unmarshal(text.as_bytes()),
            Err(RoutingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_non_utf8_is_invalid() {
        let m = TextMarshaller::default();
        let mut bytes = format!("{MAGIC}\n").into_bytes();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        assert!(matches!(m.unmarshal(&bytes), Err(RoutingError::InvalidInput(_))));
    }
}
