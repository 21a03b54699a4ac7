//! Editorial agents
//!
//! Each agent is a pair of pure functions: one builds the [`Prompt`] for a
//! stage and one turns the model's reply into a typed value. No agent talks
//! to the network or the memory store; the pipeline owns all I/O and decides
//! what a parse failure means for the run.
//!
//! - [`persona`]: vibe weights and weighted selection
//! - [`strategist`]: hook, angle, audience and call to action
//! - [`ghostwriter`]: the post body, with stored critic rules injected
//! - [`art_director`]: the image concept and its cleaned prompt
//! - [`critic`]: verdict, reasons and new rules
//! - [`networker`]: a comment pack for other people's posts
//!
//! [`Prompt`]: crate::llm::Prompt

pub mod art_director;
pub mod critic;
pub mod ghostwriter;
pub mod networker;
pub mod persona;
pub mod strategist;

use thiserror::Error;

/// Character ceiling the ghostwriter is asked to respect
pub const MAX_POST_CHARS: usize = 1500;

/// A model reply that could not be turned into the expected structure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("model returned an empty reply")]
    Empty,

    #[error("reply is missing the '{0}' field")]
    MissingField(&'static str),
}

/// Strip markdown emphasis and list markers from the start and end of a line.
pub(crate) fn strip_markup(line: &str) -> String {
    line.replace("**", "")
        .replace("__", "")
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '#' || c == '>')
        .trim()
        .to_string()
}

/// Split `Label: value` into a lowercased label and the trimmed value.
pub(crate) fn labelled(line: &str) -> Option<(String, String)> {
    let clean = strip_markup(line);
    let (label, value) = clean.split_once(':')?;
    let label = label
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
        .trim()
        .to_lowercase();
    if label.is_empty() || label.split_whitespace().count() > 3 {
        return None;
    }
    Some((label, value.trim().to_string()))
}
