use super::{labelled, persona, ParseError};
use crate::llm::Prompt;
use sdk::types::{ResearchBrief, StrategyBrief, Vibe};

pub fn prompt(vibe: Vibe, brief: &ResearchBrief, topic: &str, insight: Option<&str>) -> Prompt {
    let mut system = format!(
        "You are a LinkedIn growth strategist.\n\
         Current persona: {}\nTone: {}\n{}\n\n\
         Reply with exactly these four lines and nothing else:\n\
         Hook: <one punchy opening sentence>\n\
         Angle: <the core argument>\n\
         Audience: <who this is for>\n\
         CTA: <the closing question or call to action>",
        vibe,
        vibe.tone(),
        persona::strategist_brief(vibe),
    );

    if let Some(insight) = insight {
        system.push_str("\n\nData feedback: ");
        system.push_str(insight);
    }

    let input = format!(
        "Selected topic: {}\n\nResearch brief:\n{}",
        topic,
        brief.render()
    );

    Prompt::new(system, input)
}

/// Parse the strategist reply. Hook and angle are required.
pub fn parse(vibe: Vibe, reply: &str) -> Result<StrategyBrief, ParseError> {
    if reply.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut hook = None;
    let mut angle = None;
    let mut audience = None;
    let mut cta = None;

    for line in reply.lines() {
        let Some((label, value)) = labelled(line) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let slot = match label.as_str() {
            "hook" => &mut hook,
            "angle" => &mut angle,
            "audience" | "target audience" => &mut audience,
            "cta" | "call to action" | "call-to-action" => &mut cta,
            _ => continue,
        };
        slot.get_or_insert(value);
    }

    Ok(StrategyBrief {
        vibe,
        hook: hook.ok_or(ParseError::MissingField("hook"))?,
        angle: angle.ok_or(ParseError::MissingField("angle"))?,
        audience: audience.unwrap_or_default(),
        call_to_action: cta.unwrap_or_default(),
    })
}
