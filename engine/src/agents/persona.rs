//! Vibe selection
//!
//! Every vibe keeps a strictly positive weight, so a persona with a losing
//! streak is picked less often but never retired.

use crate::memory::PersonaStats;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use sdk::types::Vibe;
use std::collections::BTreeMap;
use tracing::debug;

/// Laplace-smoothed win rate, `(wins + 1) / (wins + losses + 2)`
pub fn weight(stats: Option<&PersonaStats>) -> f64 {
    stats.map(PersonaStats::smoothed_win_rate).unwrap_or(0.5)
}

pub fn weights(stats: &BTreeMap<Vibe, PersonaStats>) -> Vec<(Vibe, f64)> {
    Vibe::ALL
        .iter()
        .map(|v| (*v, weight(stats.get(v))))
        .collect()
}

/// Sample a vibe in proportion to its weight
pub fn select<R: Rng + ?Sized>(stats: &BTreeMap<Vibe, PersonaStats>, rng: &mut R) -> Vibe {
    let weighted = weights(stats);
    match WeightedIndex::new(weighted.iter().map(|(_, w)| *w)) {
        Ok(dist) => {
            let vibe = weighted[dist.sample(rng)].0;
            debug!(vibe = %vibe, "Vibe sampled");
            vibe
        }
        // Unreachable with positive weights; fall back to uniform
        Err(_) => Vibe::ALL[rng.gen_range(0..Vibe::ALL.len())],
    }
}

/// One-line summary of what has worked, fed to the strategist
pub fn insight(stats: &BTreeMap<Vibe, PersonaStats>) -> Option<String> {
    let best = stats
        .iter()
        .filter(|(_, s)| s.classified() > 0)
        .max_by(|a, b| {
            a.1.smoothed_win_rate()
                .total_cmp(&b.1.smoothed_win_rate())
                .then(a.1.avg_engagement.total_cmp(&b.1.avg_engagement))
        })?;

    Some(format!(
        "Best performing vibe so far: {} ({} wins, {} losses, {:.1} average reactions).",
        best.0, best.1.win_count, best.1.loss_count, best.1.avg_engagement
    ))
}

/// Strategist goal and output brief for each vibe
pub fn strategist_brief(vibe: Vibe) -> &'static str {
    match vibe {
        Vibe::Contrarian => {
            "Persona: the contrarian tech realist. Find a unique, slightly controversial \
             angle on the trend and explain why most people are wrong about it. \
             Audience: tech leaders and developers."
        }
        Vibe::Visionary => {
            "Persona: the optimistic futurist. Highlight the long-term potential of the \
             trend and how it changes the world for the better. Audience: innovators."
        }
        Vibe::Educator => {
            "Persona: the senior engineer who teaches. Demystify the concept and explain \
             how it actually works. Audience: junior and mid-level engineers."
        }
        Vibe::Analyst => {
            "Persona: the data-driven analyst. Focus on ROI, efficiency and business \
             impact. Audience: CTOs and product managers."
        }
        Vibe::Narrator => {
            "Persona: the storyteller. Frame the trend through a concrete human moment \
             and what it revealed. Audience: thoughtful professionals."
        }
        Vibe::Oracle => {
            "Persona: the forecaster. Make one specific, falsifiable prediction about \
             where this trend lands within a year. Audience: founders and investors."
        }
        Vibe::Satirist => {
            "Persona: the satirist. Puncture the hype with dry irony while still making \
             a serious point. Audience: practitioners tired of buzzwords."
        }
    }
}

/// Structure guidance for the ghostwriter
pub fn writing_style(vibe: Vibe) -> &'static str {
    match vibe {
        Vibe::Contrarian => {
            "Open with an observation that sets the scene, build tension between hype \
             and reality with specific evidence, and close with a question that invites \
             genuine debate. Like a colleague sharing a hard truth over coffee."
        }
        Vibe::Visionary => {
            "Paint where we are today, connect the technology to human impact with \
             concrete examples, and end with an invitation to imagine what comes next."
        }
        Vibe::Educator => {
            "Name the concept and why it is misunderstood, explain it step by step with \
             an analogy, then recap the one insight that matters in practice."
        }
        Vibe::Analyst => {
            "Lead with a data point, weigh the trade-offs through a business lens using \
             numbers where possible, and finish with a strategic question for leaders."
        }
        Vibe::Narrator => {
            "Tell a short first-person story with a turning point, then draw the lesson \
             out plainly. Warm, specific, no moralizing."
        }
        Vibe::Oracle => {
            "State the prediction in the first line, give the three signals behind it, \
             and say what would prove it wrong."
        }
        Vibe::Satirist => {
            "Write a deadpan take that exaggerates the hype until it breaks, then land \
             one sincere sentence about what actually matters."
        }
    }
}
