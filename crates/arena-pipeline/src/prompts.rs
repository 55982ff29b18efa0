//! Prompt constants and builders for every oracle role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble or builder
//! wording changes, so a recorded response can be traced to the prompt that
//! produced it. The wording of the answer formats here must stay in step
//! with `oracle::grammar`.

use coordination::{CompetingItem, Direction};

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.3.0";

/// Generator preamble (fan-out and evolution).
pub const GENERATOR_PREAMBLE: &str = "\
You are a scenario writer. You write one complete, concrete scenario for the \
direction you are given. Build on the direction's core assumption, stay inside \
its focus, and do not hedge between alternatives. Output only the scenario.";

/// Critic preamble (reflection scoring).
pub const CRITIC_PREAMBLE: &str = "\
You are a rigorous reviewer of scenarios. Score the scenario you are given.

Answer in exactly this format:
OVERALL: <0-100>
PLAUSIBILITY: <0-100>
COHERENCE: <0-100>
NOVELTY: <0-100>
SPECIFICITY: <0-100>
RECOMMENDATION: ADVANCE | REVISE | REJECT
CRITIQUE: <two to four sentences naming the biggest weaknesses>";

/// Judge preamble (pairwise comparison).
pub const JUDGE_PREAMBLE: &str = "\
You are an impartial judge comparing two scenarios written for the same \
direction. Judge plausibility, internal coherence and insight. Ignore length.

End your answer with exactly one line:
BETTER SCENARIO: 1   or   BETTER SCENARIO: 2";

/// Expert preamble (both debate experts).
pub const EXPERT_PREAMBLE: &str = "\
You are one of two independent experts in a structured debate. Argue from \
evidence, concede points that are correct, and be concise. When you and the \
other expert agree on the outcome, start your reply with CONSENSUS REACHED: \
followed by the agreed result.";

/// Synthesizer preamble (meta-review).
pub const SYNTHESIZER_PREAMBLE: &str = "\
You review a finished evaluation run. Write a short narrative critique of the \
process and its winners, then list concrete insights, one per line, each \
starting with \"- \".";

/// Task description for one fan-out replica.
pub fn generation_task(direction: &Direction, replica: u32, replicas: u32) -> String {
    format!(
        "Write scenario variant {} of {} for the direction \"{}\". \
         Each variant must take a distinct angle on the same core assumption.",
        replica + 1,
        replicas,
        direction.name
    )
}

/// Task description for an evolution attempt.
pub fn evolution_task(champion: &CompetingItem, instruction: &str, critique: &str) -> String {
    let critique = if critique.trim().is_empty() {
        "(no critique recorded)"
    } else {
        critique
    };
    format!(
        "Improve the scenario below.\n\nInstruction: {instruction}\n\n\
         Reviewer critique to address:\n{critique}\n\n\
         Scenario:\n{}\n\nOutput only the improved scenario.",
        champion.content
    )
}

/// First turn of a finalist debate (expert A evaluates).
pub fn finalist_opening(first: &str, second: &str, context: &str) -> String {
    format!(
        "Two finalists remain.\n\nFINALIST 1:\n{first}\n\nFINALIST 2:\n{second}\n\n\
         {context}\n\nGive your independent evaluation of both finalists."
    )
}

/// Expert B's evaluation turn, after hearing expert A.
pub fn finalist_response(opening: &str, expert_a: &str) -> String {
    format!(
        "{opening}\n\nThe other expert evaluated them as follows:\n{expert_a}\n\n\
         Give your own independent evaluation. Disagree where you should."
    )
}

/// Final verdict request for either expert.
pub fn finalist_verdict(other_expert: &str) -> String {
    format!(
        "The other expert's evaluation:\n{other_expert}\n\n\
         Give your final verdict. End with exactly one line: \
         FINAL VERDICT: 1   or   FINAL VERDICT: 2"
    )
}

/// Opening proposal of a direction-planning debate.
pub fn planning_opening(brief: &str, count: usize) -> String {
    format!(
        "Brief:\n{brief}\n\nPropose {count} distinct research directions for this brief, \
         one per line, formatted as:\nname | core assumption | focus"
    )
}

/// A follow-up turn in the planning debate.
pub fn planning_reply(other_expert: &str, count: usize) -> String {
    format!(
        "The other expert said:\n{other_expert}\n\nCritique or refine the proposal. If you \
         agree, reply with CONSENSUS REACHED: followed by the final {count} directions, one \
         per line, formatted as:\nname | core assumption | focus"
    )
}

/// Single-oracle direction generation (planning fallback).
pub fn direction_generation(brief: &str, count: usize) -> String {
    format!(
        "Brief:\n{brief}\n\nList {count} distinct research directions, one per line, \
         formatted exactly as:\nname | core assumption | focus\nOutput only the lines."
    )
}

/// Meta-review request. Sent as a generation task, so it carries the
/// synthesizer instructions itself.
pub fn meta_review(summary: &str) -> String {
    format!(
        "{SYNTHESIZER_PREAMBLE}\n\nEvaluation run summary:\n{summary}\n\n\
         Write the process critique and insights."
    )
}
