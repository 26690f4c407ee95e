//! Guest-safe response shaping.
//!
//! The guest reads replies into a fixed-size buffer and treats `\n` as the
//! end of a frame, so every reply is flattened to one line and capped in
//! UTF-8 bytes.

/// Receive buffer size of the guest kernel's serial reader.
pub const DEFAULT_RESPONSE_CAP: usize = 70;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalizer {
    pub cap: usize,
    /// Replace non-ASCII characters with `?`.
    pub ascii_only: bool,
    /// Mark truncated replies with `...` (kept within the cap).
    pub ellipsis: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_CAP)
    }
}

impl Normalizer {
    pub fn new(cap: usize) -> Self {
        Self { cap, ascii_only: false, ellipsis: false }
    }

    pub fn ascii_only(mut self, on: bool) -> Self {
        self.ascii_only = on;
        self
    }

    pub fn ellipsis(mut self, on: bool) -> Self {
        self.ellipsis = on;
        self
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len().min(self.cap + ELLIPSIS.len()));
        for c in text.chars() {
            let c = match c {
                '\n' | '\r' | '\t' => ' ',
                c if c.is_control() => continue,
                c if self.ascii_only && !c.is_ascii() => '?',
                c => c,
            };
            if c == ' ' && out.ends_with(' ') {
                continue;
            }
            out.push(c);
        }
        // Trim only after filtering: a dropped control char can expose a space.
        let mut out = out.trim().to_string();

        if out.len() <= self.cap {
            return out;
        }
        if self.ellipsis && self.cap >= ELLIPSIS.len() {
            truncate_at_boundary(&mut out, self.cap - ELLIPSIS.len());
            out.truncate(out.trim_end().len());
            out.push_str(ELLIPSIS);
        } else {
            truncate_at_boundary(&mut out, self.cap);
            out.truncate(out.trim_end().len());
        }
        out
    }
}

/// Truncate to at most `max` bytes without splitting a character.
fn truncate_at_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Flatten and cap `text` to `cap` bytes with default settings.
pub fn normalize(text: &str, cap: usize) -> String {
    Normalizer::new(cap).apply(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize("", 70), "");
        assert_eq!(normalize(" \n\t ", 70), "");
    }

    #[test]
    fn test_newlines_are_flattened() {
        assert_eq!(normalize("  line one\r\nline two\n\n  ", 70), "line one line two");
    }

    #[test]
    fn test_control_chars_at_the_edges_leave_no_space() {
        assert_eq!(normalize("\u{7} hi", 70), "hi");
        assert_eq!(normalize("hi \u{7}", 70), "hi");
        assert_eq!(normalize("\u{0}\t hi \u{1b}\r\n", 70), "hi");
    }

    #[test]
    fn test_truncates_on_byte_budget() {
        let out = normalize(&"a".repeat(200), 70);
        assert_eq!(out.len(), 70);
    }

    #[test]
    fn test_never_splits_a_character() {
        // 'é' is two bytes; 35 of them fill exactly 70, 36 would overflow.
        let out = normalize(&"é".repeat(50), 71);
        assert_eq!(out.len(), 70);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_cap_and_delimiter_hold_for_mixed_inputs() {
        let repeated = "x\n".repeat(100);
        let samples: [&str; 5] = [
            "plain",
            "multi\nline\nreply with trailing newline\n",
            "ünïcödé everywhere 🚀🚀🚀 and more text to push past the cap for sure",
            "\u{7}bell\u{0}nul and control chars",
            repeated.as_str(),
        ];
        for cap in [0, 1, 3, 10, 70] {
            for s in samples {
                let out = normalize(s, cap);
                assert!(out.len() <= cap, "{out:?} exceeds {cap}");
                assert!(!out.contains('\n'));
                assert!(!out.chars().any(char::is_control));
            }
        }
    }

    #[test]
    fn test_ascii_only_replaces() {
        let n = Normalizer::new(70).ascii_only(true);
        assert_eq!(n.apply("système"), "syst?me");
    }

    #[test]
    fn test_ellipsis_stays_within_cap() {
        let n = Normalizer::new(10).ellipsis(true);
        let out = n.apply("abcdefghijklmnop");
        assert_eq!(out, "abcdefg...");
        assert_eq!(n.apply("short"), "short");
    }
}
