//! Sanitization for untrusted inbound text.
//!
//! Every private message passes through here before it is classified, so command
//! arguments and guidance share the same control-character and length rules.

use tracing::warn;

/// Maximum length for general inbound input
pub const MAX_INPUT_LENGTH: usize = 10_000;

/// Maximum length for command arguments
pub const MAX_COMMAND_ARGS_LENGTH: usize = 1_000;

/// Maximum length for a guidance message
pub const MAX_GUIDANCE_LENGTH: usize = 5_000;

/// Strip control characters (keeping `\n` and `\t`), cap to `max_chars`, and trim.
///
/// Covers the C0 range, DEL, and the C1 range.
pub fn sanitize_input(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect();

    let char_count = cleaned.chars().count();
    let capped = if char_count > max_chars {
        warn!(
            "Input truncated from {} to {} characters",
            char_count, max_chars
        );
        cleaned.chars().take(max_chars).collect()
    } else {
        cleaned
    };

    capped.trim().to_string()
}

/// Sanitize command arguments
pub fn sanitize_command_args(args: &str) -> String {
    sanitize_input(args, MAX_COMMAND_ARGS_LENGTH)
}

/// Cut `text` to at most `max_chars` characters, ending with `...` when cut.
///
/// Returns the text and whether it was truncated.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    (out, true)
}
