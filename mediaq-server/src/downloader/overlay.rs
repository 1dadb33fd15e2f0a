//! Extra option overlay
//!
//! Turns the free-form option string a user attaches to a job into an
//! ordered list of `key -> value` entries. Splitting follows POSIX shell
//! quoting rules; option names follow the yt-dlp command line with dashes
//! normalised to underscores (`--audio-format mp3` -> `audio_format = "mp3"`).

use tracing::warn;

/// Value attached to an overlay key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Option given without an argument, e.g. `--embed-thumbnail`
    Flag,
    Value(String),
}

/// Malformed extra option string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverlayError {
    #[error("failed to parse extra options: no closing quotation ({0})")]
    UnterminatedQuote(char),

    #[error("failed to parse extra options: no escaped character")]
    TrailingEscape,
}

/// Parsed user overrides, in the order they were written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionOverlay {
    entries: Vec<(String, OptionValue)>,
}

impl OptionOverlay {
    /// Parse an extra option string
    ///
    /// `--key value` pairs become values and a `--key` followed by another
    /// option (or nothing) becomes a flag. `--key=value` is accepted as well.
    /// Short options and stray words are skipped.
    pub fn parse(input: &str) -> Result<Self, OverlayError> {
        let tokens = split_shell_words(input)?;
        let mut entries = Vec::new();
        let mut iter = tokens.into_iter().peekable();

        while let Some(token) = iter.next() {
            let Some(name) = token.strip_prefix("--") else {
                warn!("Ignoring extra option token without '--' prefix: {}", token);
                continue;
            };

            if let Some((name, value)) = name.split_once('=') {
                if let Some(key) = normalize_key(name) {
                    entries.push((key, OptionValue::Value(value.to_string())));
                }
                continue;
            }

            let Some(key) = normalize_key(name) else {
                warn!("Ignoring empty extra option name");
                continue;
            };

            let value = match iter.peek() {
                Some(next) if !next.starts_with("--") => {
                    OptionValue::Value(iter.next().unwrap_or_default())
                }
                _ => OptionValue::Flag,
            };
            entries.push((key, value));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, OptionValue)] {
        &self.entries
    }
}

fn normalize_key(name: &str) -> Option<String> {
    let key = name.trim().replace('-', "_");
    (!key.is_empty()).then_some(key)
}

/// Split a string into words using POSIX shell quoting rules
pub fn split_shell_words(input: &str) -> Result<Vec<String>, OverlayError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(OverlayError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(OverlayError::UnterminatedQuote('"')),
                        },
                        Some(c) => current.push(c),
                        None => return Err(OverlayError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some('\n') => {}
                    Some(c) => current.push(c),
                    None => return Err(OverlayError::TrailingEscape),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    Ok(words)
}
