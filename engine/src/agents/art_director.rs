use crate::llm::Prompt;
use sdk::types::StrategyBrief;

/// Longest image prompt sent to the generator; it travels in a URL path
pub const MAX_IMAGE_PROMPT_CHARS: usize = 800;

pub fn prompt(strategy: &StrategyBrief) -> Prompt {
    let system = format!(
        "You are an image prompt engineer.\n\
         Current style: {}\nVisual style: {}\n\n\
         Strict output format, no chat:\n\
         Visual Format: <format>\n\
         Prompt: <the image prompt>\n\
         Text Overlay: <short overlay text>",
        strategy.vibe,
        strategy.vibe.visual_style(),
    );

    let input = format!(
        "Hook: {}\nAngle: {}\nAudience: {}",
        strategy.hook, strategy.angle, strategy.audience
    );

    Prompt::new(system, input)
}

/// Reduce an art-director reply to a bare image prompt.
///
/// Keeps the text after `Prompt:` and before `Text Overlay:` when present,
/// drops markdown emphasis, collapses whitespace and truncates. Returns
/// `None` when nothing usable is left.
pub fn clean_image_prompt(reply: &str) -> Option<String> {
    let plain: String = reply.chars().filter(|c| *c != '*' && *c != '`').collect();

    let mut text = plain.as_str();
    if let Some((_, after)) = text.split_once("Prompt:") {
        text = after;
        if let Some((before, _)) = text.split_once("Text Overlay:") {
            text = before;
        }
    }

    let text = text.replace("Generate a high quality image:", "");
    let collapsed = text
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#' || c == '_'))
        .collect::<Vec<_>>()
        .join(" ");

    let truncated: String = collapsed.chars().take(MAX_IMAGE_PROMPT_CHARS).collect();
    let truncated = truncated.trim().to_string();

    if truncated.is_empty() {
        None
    } else {
        Some(truncated)
    }
}
