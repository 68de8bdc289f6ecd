// src/mpdconf.rs

//! MPD configuration file format
//!
//! Line oriented: `key "value"` per line, `#` starts a comment. Block
//! sections such as `audio_output { ... }` are recognised and skipped; only
//! top-level settings are returned.

use crate::error::{Error, Result};
use std::fmt::Write as _;

/// An ordered set of top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MpdConfig {
    entries: Vec<(String, String)>,
}

impl MpdConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimal configuration for the smoke test
    pub fn bound_to(address: &str, port: u16) -> Self {
        let mut config = Self::new();
        config.set("bind_to_address", address);
        config.set("port", &port.to_string());
        config
    }

    /// Set a value, replacing an earlier one with the same key
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render in file format
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            let _ = writeln!(out, "{} \"{}\"", key, escaped);
        }
        out
    }

    /// Parse file contents
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::new();
        let mut depth = 0usize;

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line == "}" {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::ParseError(format!("line {}: unmatched '}}'", idx + 1))
                })?;
                continue;
            }
            if line.ends_with('{') {
                depth += 1;
                continue;
            }
            if depth > 0 {
                continue;
            }

            let (key, value) = parse_setting(line)
                .ok_or_else(|| Error::ParseError(format!("line {}: expected key \"value\"", idx + 1)))?;
            config.set(&key, &value);
        }

        if depth != 0 {
            return Err(Error::ParseError("unterminated block".to_string()));
        }

        Ok(config)
    }
}

fn parse_setting(line: &str) -> Option<(String, String)> {
    let (key, rest) = line.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let inner = rest.strip_prefix('"')?;

    let mut value = String::new();
    let mut chars = inner.chars();
    loop {
        match chars.next()? {
            '\\' => value.push(chars.next()?),
            '"' => break,
            c => value.push(c),
        }
    }

    // Only a trailing comment may follow the closing quote
    let tail = chars.as_str().trim();
    if !tail.is_empty() && !tail.starts_with('#') {
        return None;
    }

    Some((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_minimal() {
        let config = MpdConfig::bound_to("127.0.0.1", 6601);
        assert_eq!(config.render(), "bind_to_address \"127.0.0.1\"\nport \"6601\"\n");
    }

    #[test]
    fn test_parse_skips_blocks_and_comments() {
        let content = r#"
# Files and directories
music_directory "~/music"   # trailing comment
playlist_directory "~/.mpd/playlists"

audio_output {
    type "osx"
    name "CoreAudio"
}

port "6600"
"#;
        let config = MpdConfig::parse(content).unwrap();
        assert_eq!(config.len(), 3);
        assert_eq!(config.get("music_directory"), Some("~/music"));
        assert_eq!(config.get("port"), Some("6600"));
        assert_eq!(config.get("type"), None);
    }

    #[test]
    fn test_parse_escapes() {
        let config = MpdConfig::parse(r#"name "say \"hi\"""#).unwrap();
        assert_eq!(config.get("name"), Some("say \"hi\""));

        let rendered = config.render();
        assert_eq!(MpdConfig::parse(&rendered).unwrap(), config);
    }

    #[test]
    fn test_parse_errors() {
        assert!(MpdConfig::parse("port 6600").is_err());
        assert!(MpdConfig::parse("port \"6600").is_err());
        assert!(MpdConfig::parse("}").is_err());
        assert!(MpdConfig::parse("audio_output {\n type \"osx\"").is_err());
    }

    #[test]
    fn test_set_replaces() {
        let mut config = MpdConfig::bound_to("127.0.0.1", 1);
        config.set("port", "2");
        assert_eq!(config.len(), 2);
        assert_eq!(config.get("port"), Some("2"));
    }
}
