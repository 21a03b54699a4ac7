use super::{persona, ParseError, MAX_POST_CHARS};
use crate::llm::Prompt;
use sdk::types::{CriticRule, Draft, ResearchBrief, StrategyBrief};

const BANNED_PHRASES: &[&str] = &["In conclusion", "In summary", "Delve", "Crucial", "Landscape"];

/// Build the drafting prompt.
///
/// `feedback` carries the critic's reasons when this is a revision.
pub fn prompt(
    strategy: &StrategyBrief,
    brief: &ResearchBrief,
    rules: &[CriticRule],
    feedback: Option<&[String]>,
) -> Prompt {
    let system = format!(
        "You are a LinkedIn creator writing in your own voice.\n\
         Current persona: {}\nTone: {}\nStructure: {}\n\n\
         Rules:\n\
         1. Never use: {}.\n\
         2. Write like a person, not a press release.\n\
         3. Hard limit of {} characters.\n\
         4. Reply with the post text only.",
        strategy.vibe,
        strategy.vibe.tone(),
        persona::writing_style(strategy.vibe),
        BANNED_PHRASES.join(", "),
        MAX_POST_CHARS,
    );

    let mut input = format!(
        "Hook: {}\nAngle: {}\nAudience: {}\nCTA: {}\n\nResearch:\n{}",
        strategy.hook,
        strategy.angle,
        strategy.audience,
        strategy.call_to_action,
        brief.render()
    );

    if !rules.is_empty() {
        input.push_str("\n\nLessons from past posts (do not ignore):");
        for rule in rules {
            input.push_str("\n- ");
            input.push_str(&rule.text);
        }
    }

    if let Some(reasons) = feedback.filter(|r| !r.is_empty()) {
        input.push_str("\n\nThe previous draft was rejected. Fix these problems:");
        for reason in reasons {
            input.push_str("\n- ");
            input.push_str(reason);
        }
    }

    Prompt::new(system, input)
}

/// Turn a reply into a draft, dropping any wrapping code fence or quotes.
pub fn parse(reply: &str, revision: bool) -> Result<Draft, ParseError> {
    let mut text = reply.trim();

    if let Some(inner) = text.strip_prefix("```") {
        // Skip an optional language tag on the fence line
        let inner = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or(inner);
        text = inner.strip_suffix("```").unwrap_or(inner).trim();
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }

    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let tag = if revision { "revision" } else { "initial" };
    Ok(Draft::new(text, tag))
}
