//! Comment packs
//!
//! Drafts three replies a person could leave on someone else's post about the
//! same trend. Packs are stored for review and never submitted.

use super::{labelled, ParseError};
use crate::llm::Prompt;
use chrono::Utc;
use sdk::types::{CommentDraft, CommentPack, ResearchBrief};

pub const STYLES: [&str; 3] = ["value_add", "contrarian", "question"];

const SYSTEM: &str = "You are a networking expert. Help the user grow by commenting on \
other people's posts about this trend.\n\
Write three distinct comments:\n\
1. Value Add: agree with the premise and add a specific example or data point.\n\
2. Contrarian: respectfully disagree or point out a missing nuance.\n\
3. Question: ask a thoughtful question that invites a reply.\n\n\
Format:\n\
Value Add: <comment>\n\
Contrarian: <comment>\n\
Question: <comment>";

pub fn prompt(brief: &ResearchBrief) -> Prompt {
    Prompt::new(SYSTEM, format!("Trend:\n{}", brief.render()))
}

fn style_for(label: &str) -> Option<&'static str> {
    match label {
        "value add" | "value-add" | "value_add" => Some(STYLES[0]),
        "contrarian" => Some(STYLES[1]),
        "question" => Some(STYLES[2]),
        _ => None,
    }
}

/// Parse the networker reply. Lines after a style label continue its draft.
pub fn parse(target_post_ref: &str, reply: &str) -> Result<CommentPack, ParseError> {
    let mut drafts: Vec<CommentDraft> = Vec::new();
    let mut current: Option<usize> = None;

    for line in reply.lines() {
        if let Some((label, value)) = labelled(line) {
            if let Some(style) = style_for(&label) {
                match drafts.iter().position(|d| d.style_tag == style) {
                    Some(existing) => current = Some(existing),
                    None => {
                        drafts.push(CommentDraft {
                            style_tag: style.to_string(),
                            text: value,
                        });
                        current = Some(drafts.len() - 1);
                    }
                }
                continue;
            }
        }

        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        if let Some(draft) = current.and_then(|i| drafts.get_mut(i)) {
            if !draft.text.is_empty() {
                draft.text.push(' ');
            }
            draft.text.push_str(text);
        }
    }

    drafts.retain(|d| !d.text.trim().is_empty());
    if drafts.is_empty() {
        return Err(ParseError::MissingField("comment drafts"));
    }

    Ok(CommentPack {
        target_post_ref: target_post_ref.to_string(),
        drafts,
        created_at: Utc::now(),
    })
}
