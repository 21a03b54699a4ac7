use super::strip_markup;
use crate::llm::Prompt;
use sdk::types::{CriticRule, CriticVerdict, Draft};

const SYSTEM: &str = "You are a harsh LinkedIn critic reviewing a draft post.\n\
If it sounds machine-written, say so.\n\
Checklist:\n\
- Is the hook boring?\n\
- Are there too many adjectives?\n\
- Is the formatting scannable?\n\
- Does it break any of the stored lessons?\n\n\
Reply format:\n\
VERDICT: APPROVED or VERDICT: REJECTED\n\
- <one line per reason>\n\
If you find a recurring mistake worth remembering, add a line starting with \"RULE:\".\n\
Example: RULE: Never use the word 'unleash'.";

pub fn prompt(draft: &Draft, visual_prompt: Option<&str>, rules: &[CriticRule]) -> Prompt {
    let mut input = format!("Draft ({} characters):\n{}", draft.character_count, draft.text);

    if let Some(visual) = visual_prompt {
        input.push_str("\n\nVisual concept: ");
        input.push_str(visual);
    }

    if !rules.is_empty() {
        input.push_str("\n\nStored lessons:");
        for rule in rules {
            input.push_str("\n- ");
            input.push_str(&rule.text);
        }
    }

    Prompt::new(SYSTEM, input)
}

/// Parse a critic reply. A reply without a verdict line is a rejection.
pub fn parse(reply: &str) -> CriticVerdict {
    let mut verdict = None;
    let mut reasons = Vec::new();
    let mut rules = Vec::new();

    for raw in reply.lines() {
        let trimmed = raw.trim();
        let line = strip_markup(trimmed);
        let upper = line.to_uppercase();

        if let Some(rest) = upper.strip_prefix("VERDICT:") {
            if verdict.is_none() {
                let rest = rest.trim();
                if rest.starts_with("APPROVED") {
                    verdict = Some(true);
                } else if rest.starts_with("REJECTED") {
                    verdict = Some(false);
                }
            }
            continue;
        }

        if upper.starts_with("RULE:") {
            let rule = line.get("RULE:".len()..).unwrap_or_default().trim();
            if !rule.is_empty() {
                rules.push(rule.to_string());
            }
            continue;
        }

        if (trimmed.starts_with("- ") || trimmed.starts_with("* ")) && !line.is_empty() {
            reasons.push(line);
        }
    }

    if verdict.is_none() {
        reasons.insert(0, "critic reply had no verdict line".to_string());
    }

    CriticVerdict {
        approved: verdict.unwrap_or(false),
        reasons,
        rules,
    }
}
