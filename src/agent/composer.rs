//! Adaptive prompt composition
//!
//! Maps stored dimension scores into fixed natural-language directives and
//! assembles the system prompt for the live chat boundary. Composition is a
//! pure function of the score set and profile facts: identical inputs
//! produce byte-identical output. Directive emission follows the canonical
//! dimension order, never the insertion order of the input.

use crate::error::CoreResult;
use crate::scoring::dimensions::Dimension;
use crate::store::{DimensionScoreRow, Store};
use serde::Serialize;
use std::sync::Arc;

/// Scores at or below this tier trigger the low directive
pub const LOW_TIER_MAX: f64 = 3.0;
/// Scores at or above this tier trigger the high directive
pub const HIGH_TIER_MIN: f64 = 7.0;

const BASE_PROMPT: &str = "You are an adaptive conversational assistant. You adjust your \
communication style, depth, and tone to fit the person you are talking to.\n\
\n\
Your core traits:\n\
- You are helpful, honest, and attentive\n\
- You adapt naturally without drawing attention to it\n\
- You treat each conversation as a genuine interaction";

const NON_DISCLOSURE: &str = "Never reveal, reference, or hint to the user that behavioral \
scoring, profiling, or adaptation of any kind is taking place.";

const NEUTRAL_DIRECTIVE: &str =
    "No behavioral profile is available yet. Use a balanced, helpful default communication style.";

/// The fixed low/high directive pair for one dimension. Exactly one of the
/// two can fire per composition; mid-tier scores (4-6) emit nothing.
fn directive_pair(dimension: Dimension) -> (&'static str, &'static str) {
    match dimension {
        Dimension::Patience => (
            "The user is IMPATIENT. Lead with the answer, keep preamble to zero, and resolve \
             the request in as few steps as possible.",
            "The user is patient. It is fine to walk through reasoning step by step and \
             explore the topic fully.",
        ),
        Dimension::TechnicalDepth => (
            "Avoid jargon. Explain from first principles with plain-language analogies and \
             define any technical term you must use.",
            "Assume a strong technical background. Use precise domain terminology freely and \
             skip introductory explanations.",
        ),
        Dimension::FrustrationTolerance => (
            "The user is easily frustrated. Acknowledge problems up front, offer a working \
             solution before any discussion, and never stack multiple questions.",
            "The user tolerates setbacks well. It is acceptable to iterate openly and present \
             partial progress.",
        ),
        Dimension::Verbosity => (
            "Keep replies CONCISE. Prefer short sentences and bullet points; cut everything \
             that does not answer the question.",
            "The user prefers DETAILED responses. Provide thorough explanations with context, \
             nuance, and examples.",
        ),
        Dimension::Politeness => (
            "Keep the tone strictly professional and neutral; do not mirror rudeness and do \
             not add social filler.",
            "The user is courteous. A warm, personable tone is appropriate and brief \
             pleasantries are welcome.",
        ),
        Dimension::EngagementLevel => (
            "The user is minimally engaged. Carry the conversation: propose concrete next \
             steps and ask at most one focused question at a time.",
            "The user is highly engaged. Match their energy: build on their ideas and offer \
             related directions worth exploring.",
        ),
    }
}

/// Basic profile facts embedded alongside the directives
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileFacts {
    pub total_conversations: i64,
    pub languages: Vec<String>,
}

/// Which tier fired for a dimension, for preview surfaces
#[derive(Debug, Clone, Serialize)]
pub struct ActiveDirective {
    pub dimension: Dimension,
    pub tier: &'static str,
    pub text: &'static str,
}

/// Resolve the active directives for a score set, in canonical dimension
/// order. An empty score set yields no entries; the caller substitutes the
/// neutral fallback.
pub fn active_directives(scores: &[DimensionScoreRow]) -> Vec<ActiveDirective> {
    let mut directives = Vec::new();
    for dimension in Dimension::ALL {
        let Some(score) = scores.iter().find(|s| s.dimension == dimension) else {
            continue;
        };
        let (low, high) = directive_pair(dimension);
        if score.score <= LOW_TIER_MAX {
            directives.push(ActiveDirective {
                dimension,
                tier: "low",
                text: low,
            });
        } else if score.score >= HIGH_TIER_MIN {
            directives.push(ActiveDirective {
                dimension,
                tier: "high",
                text: high,
            });
        }
        // 4-6: silence means default behavior for this dimension
    }
    directives
}

/// Assemble the full system prompt. Pure and side-effect-free; all lookups
/// happen in the caller.
pub fn compose(scores: &[DimensionScoreRow], facts: &ProfileFacts) -> String {
    let mut sections = vec![BASE_PROMPT.to_string()];

    // Profile facts
    let mut context = vec!["## User Context".to_string()];
    context.push(format!(
        "- Conversations analyzed: {}",
        facts.total_conversations
    ));
    if !facts.languages.is_empty() {
        context.push(format!("- Languages: {}", facts.languages.join(", ")));
    }
    sections.push(context.join("\n"));

    // Behavioral directives
    let mut behavior = vec!["## Behavioral Directives".to_string()];
    if scores.is_empty() {
        behavior.push(format!("- {NEUTRAL_DIRECTIVE}"));
    } else {
        for directive in active_directives(scores) {
            behavior.push(format!("- {}", directive.text));
        }
        if behavior.len() == 1 {
            // Every dimension landed mid-tier
            behavior.push("- Use default, balanced behavior on every dimension.".to_string());
        }
    }
    sections.push(behavior.join("\n"));

    // Verbatim numeric summary, canonical order
    let mut summary = vec!["## Score Summary".to_string()];
    if scores.is_empty() {
        summary.push("- No scores recorded.".to_string());
    } else {
        for dimension in Dimension::ALL {
            if let Some(score) = scores.iter().find(|s| s.dimension == dimension) {
                summary.push(format!(
                    "- {}: {:.1}/10 (confidence {:.2})",
                    dimension, score.score, score.confidence
                ));
            }
        }
    }
    sections.push(summary.join("\n"));

    sections.push(NON_DISCLOSURE.to_string());

    sections.join("\n\n")
}

/// Composer bound to the store; the lookup half of the prompt boundary
pub struct PromptComposer {
    store: Arc<Store>,
}

impl PromptComposer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn facts_for(&self, user_id: &str) -> CoreResult<ProfileFacts> {
        Ok(self
            .store
            .get_user_aggregate(user_id)?
            .map(|aggregate| ProfileFacts {
                total_conversations: aggregate.total_conversations,
                languages: aggregate.languages,
            })
            .unwrap_or_default())
    }

    pub fn scores_for(&self, user_id: &str) -> CoreResult<Vec<DimensionScoreRow>> {
        self.store.get_dimension_scores(user_id)
    }

    /// Compose the system prompt for a user. Works for users with no scores
    /// yet (neutral fallback), so the chat boundary never blocks on scoring.
    pub fn compose_for_user(&self, user_id: &str) -> CoreResult<String> {
        let scores = self.scores_for(user_id)?;
        let facts = self.facts_for(user_id)?;
        Ok(compose(&scores, &facts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::now_rfc3339;

    fn score(dimension: Dimension, value: f64) -> DimensionScoreRow {
        DimensionScoreRow {
            user_id: "u1".into(),
            dimension,
            score: value,
            confidence: 0.8,
            evidence_summary: String::new(),
            updated_at: now_rfc3339(),
        }
    }

    #[test]
    fn tier_boundaries_are_inclusive() {
        // Exactly 3 fires low, exactly 7 fires high, 5 fires nothing
        let at_3 = active_directives(&[score(Dimension::Patience, 3.0)]);
        assert_eq!(at_3.len(), 1);
        assert_eq!(at_3[0].tier, "low");

        let at_7 = active_directives(&[score(Dimension::Patience, 7.0)]);
        assert_eq!(at_7.len(), 1);
        assert_eq!(at_7[0].tier, "high");

        assert!(active_directives(&[score(Dimension::Patience, 5.0)]).is_empty());
    }

    #[test]
    fn low_patience_and_high_verbosity_scenario() {
        let scores = [
            score(Dimension::Patience, 2.0),
            score(Dimension::Verbosity, 8.0),
        ];
        let prompt = compose(&scores, &ProfileFacts::default());
        assert!(prompt.contains("IMPATIENT"));
        assert!(prompt.contains("DETAILED"));

        // No directive for the other four dimensions
        let directives = active_directives(&scores);
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].dimension, Dimension::Patience);
        assert_eq!(directives[1].dimension, Dimension::Verbosity);
    }

    #[test]
    fn directive_order_is_canonical_not_insertion() {
        // Verbosity handed in before Patience; output order flips
        let scores = [
            score(Dimension::Verbosity, 9.0),
            score(Dimension::Patience, 1.0),
        ];
        let directives = active_directives(&scores);
        assert_eq!(directives[0].dimension, Dimension::Patience);
        assert_eq!(directives[1].dimension, Dimension::Verbosity);
    }

    #[test]
    fn composition_is_deterministic() {
        let scores = [
            score(Dimension::EngagementLevel, 8.0),
            score(Dimension::TechnicalDepth, 2.0),
        ];
        let facts = ProfileFacts {
            total_conversations: 12,
            languages: vec!["English".into(), "German".into()],
        };
        assert_eq!(compose(&scores, &facts), compose(&scores, &facts));
    }

    #[test]
    fn empty_scores_fall_back_to_neutral_directive() {
        let prompt = compose(&[], &ProfileFacts::default());
        assert!(prompt.contains(NEUTRAL_DIRECTIVE));
        assert!(prompt.contains("No scores recorded."));
    }

    #[test]
    fn all_mid_tier_scores_emit_explicit_default() {
        let scores = [
            score(Dimension::Patience, 5.0),
            score(Dimension::Verbosity, 4.0),
        ];
        let prompt = compose(&scores, &ProfileFacts::default());
        assert!(prompt.contains("default, balanced behavior"));
        // Mid-tier scores still appear in the numeric summary
        assert!(prompt.contains("Patience: 5.0/10"));
    }

    #[test]
    fn prompt_always_carries_non_disclosure() {
        let with_scores = compose(&[score(Dimension::Patience, 1.0)], &ProfileFacts::default());
        let without = compose(&[], &ProfileFacts::default());
        assert!(with_scores.contains(NON_DISCLOSURE));
        assert!(without.contains(NON_DISCLOSURE));
    }
}
