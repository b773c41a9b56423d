//! Prompt rendering for the conversation window.

use voxa_types::{Role, Turn};

/// Number of most recent turns sent to the model by default.
pub const DEFAULT_WINDOW_TURNS: usize = 10;

/// Renders a window of turns into a single prompt string.
///
/// Each turn becomes one `Label: text` line, followed by an open
/// `Assistant:` cue. A non-empty `preamble` is placed on the first line.
pub fn build_prompt(window: &[Turn], preamble: Option<&str>) -> String {
    let mut prompt = String::new();

    if let Some(preamble) = preamble.map(str::trim).filter(|p| !p.is_empty()) {
        prompt.push_str(preamble);
        prompt.push('\n');
    }

    for turn in window {
        prompt.push_str(turn.role.label());
        prompt.push_str(": ");
        prompt.push_str(turn.text.trim());
        prompt.push('\n');
    }

    prompt.push_str(Role::Assistant.label());
    prompt.push(':');
    prompt
}
