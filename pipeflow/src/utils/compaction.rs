//! Compaction of large results and restoration of moved elements.
//!
//! A pipe can move the content of a named element into the session, leaving a
//! `{sessionKey:<key>}` reference behind, and can truncate long character data.
//! A later pipe restores the references from the session.

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::core::PipeLineSession;
use crate::errors::ConfigurationError;

const REFERENCE_PREFIX: &str = "{sessionKey:";

fn reference_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{sessionKey:([^}]+)\}").ok())
        .as_ref()
}

/// Settings describing how a result is compacted.
#[derive(Debug, Clone, Default)]
pub struct Compactor {
    chomp_char_size: Option<usize>,
    element_to_move: Option<String>,
    element_to_move_session_key: Option<String>,
    element_pattern: Option<Regex>,
}

impl Compactor {
    /// Creates a compactor.
    ///
    /// # Errors
    ///
    /// Returns an error if the element name cannot be matched.
    pub fn new(
        chomp_char_size: Option<usize>,
        element_to_move: Option<String>,
        element_to_move_session_key: Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let element_pattern = match element_to_move.as_deref() {
            Some(name) => Some(
                Regex::new(&format!(
                    r"(?s)(<{0}(?:\s[^>]*)?>)(.*?)(</{0}>)",
                    regex::escape(name)
                ))
                .map_err(|e| {
                    ConfigurationError::new(format!("invalid elementToMove [{name}]: {e}"))
                })?,
            ),
            None => None,
        };
        Ok(Self {
            chomp_char_size,
            element_to_move,
            element_to_move_session_key,
            element_pattern,
        })
    }

    /// Returns true if this compactor changes anything.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.chomp_char_size.is_some() || self.element_pattern.is_some()
    }

    /// Compacts `text`, storing moved element content in the session.
    pub fn compact(&self, text: &str, session: &mut PipeLineSession) -> String {
        let mut compacted = text.to_string();

        if let (Some(pattern), Some(element)) = (&self.element_pattern, &self.element_to_move) {
            let base_key = self
                .element_to_move_session_key
                .clone()
                .unwrap_or_else(|| element.clone());
            let mut moved = Vec::new();
            compacted = pattern
                .replace_all(&compacted, |caps: &Captures<'_>| {
                    let key = if moved.is_empty() {
                        base_key.clone()
                    } else {
                        format!("{base_key}{}", moved.len() + 1)
                    };
                    moved.push((key.clone(), caps[2].to_string()));
                    format!("{}{REFERENCE_PREFIX}{key}}}{}", &caps[1], &caps[3])
                })
                .into_owned();
            for (key, content) in moved {
                session.insert(key, content);
            }
        }

        if let Some(size) = self.chomp_char_size {
            compacted = chomp(&compacted, size);
        }

        compacted
    }
}

/// Truncates every run of character data between tags that is longer than `size`.
fn chomp(text: &str, size: usize) -> String {
    let mut out = String::with_capacity(text.len().min(size * 4));
    let mut chars = text.chars();
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String| {
        if run.chars().count() > size {
            out.extend(run.chars().take(size));
            out.push_str("...");
        } else {
            out.push_str(run);
        }
        run.clear();
    };

    while let Some(c) = chars.next() {
        if c == '<' {
            flush(&mut run, &mut out);
            out.push(c);
            for t in chars.by_ref() {
                out.push(t);
                if t == '>' {
                    break;
                }
            }
        } else {
            run.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}

/// Replaces every `{sessionKey:<key>}` reference with the session value.
/// References to absent keys are left untouched.
#[must_use]
pub fn restore_moved_elements(text: &str, session: &PipeLineSession) -> String {
    let Some(pattern) = reference_pattern().filter(|_| text.contains(REFERENCE_PREFIX)) else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            session
                .get_string(&caps[1])
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_element_to_session() {
        let compactor = Compactor::new(None, Some("doc".to_string()), None).unwrap();
        let mut session = PipeLineSession::new();

        let out = compactor.compact("<root><doc id=\"1\">big</doc><doc>other</doc></root>", &mut session);

        assert_eq!(
            out,
            "<root><doc id=\"1\">{sessionKey:doc}</doc><doc>{sessionKey:doc2}</doc></root>"
        );
        assert_eq!(session.get_string("doc"), Some("big".to_string()));
        assert_eq!(session.get_string("doc2"), Some("other".to_string()));
    }

    #[test]
    fn test_move_element_with_custom_key() {
        let compactor =
            Compactor::new(None, Some("doc".to_string()), Some("payload".to_string())).unwrap();
        let mut session = PipeLineSession::new();

        let out = compactor.compact("<doc>x</doc>", &mut session);
        assert_eq!(out, "<doc>{sessionKey:payload}</doc>");
        assert_eq!(session.get_string("payload"), Some("x".to_string()));
    }

    #[test]
    fn test_chomp() {
        let compactor = Compactor::new(Some(3), None, None).unwrap();
        let mut session = PipeLineSession::new();

        assert_eq!(compactor.compact("<a>abcdef</a><b>ab</b>", &mut session), "<a>abc...</a><b>ab</b>");
        assert_eq!(compactor.compact("plain text", &mut session), "pla...");
    }

    #[test]
    fn test_inactive_compactor() {
        assert!(!Compactor::default().is_active());
        assert!(Compactor::new(Some(10), None, None).unwrap().is_active());
    }

    #[test]
    fn test_restore_round_trip() {
        let compactor = Compactor::new(None, Some("doc".to_string()), None).unwrap();
        let mut session = PipeLineSession::new();
        let original = "<root><doc>content</doc></root>";

        let compacted = compactor.compact(original, &mut session);
        assert_eq!(restore_moved_elements(&compacted, &session), original);
    }

    #[test]
    fn test_restore_keeps_unknown_references() {
        let session = PipeLineSession::new();
        assert_eq!(restore_moved_elements("{sessionKey:missing}", &session), "{sessionKey:missing}");
    }
}
