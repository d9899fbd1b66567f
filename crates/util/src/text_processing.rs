//! Text processing helpers for subprocess output.

use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // CSI sequences plus the short two-byte escapes emitted by most CLIs.
    Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|[@-Z\\-_])").expect("valid ansi pattern")
});

/// Removes ANSI escape sequences (colors, cursor movement) from a string.
///
/// Subprocess stdout/stderr is streamed through this before it is logged or
/// buffered, so captured line sequences stay plain text.
pub fn strip_ansi_codes(input: &str) -> String {
    ANSI_ESCAPE_PATTERN.replace_all(input, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_sequences() {
        let colored = "\x1b[32mok\x1b[0m done";
        assert_eq!(strip_ansi_codes(colored), "ok done");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(strip_ansi_codes("plain text"), "plain text");
    }

    #[test]
    fn strips_cursor_and_erase_sequences() {
        assert_eq!(strip_ansi_codes("\x1b[2K\x1b[1Gprogress 50%"), "progress 50%");
    }
}
