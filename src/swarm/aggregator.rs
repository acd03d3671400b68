//! Result aggregation — folds N agent results into one output string
//! under a consensus strategy.

use crate::config::ConsensusStrategy;

use super::agent::{AgentResult, AgentStatus};
use super::roles::SwarmRole;

/// Combine agent results for `task` under `strategy`.
///
/// With zero successful results, every strategy degenerates to an
/// all-failed report listing each failure.
pub fn aggregate(strategy: ConsensusStrategy, task: &str, results: &[AgentResult]) -> String {
    let successes: Vec<&AgentResult> = results
        .iter()
        .filter(|r| r.status == AgentStatus::Done)
        .collect();
    let failures: Vec<&AgentResult> = results
        .iter()
        .filter(|r| r.status != AgentStatus::Done)
        .collect();

    if successes.is_empty() {
        let mut out = String::from("All agents failed.\n");
        for failure in &failures {
            out.push_str(&format!("{}: {}\n", failure.role, failure.output));
        }
        return out;
    }

    match strategy {
        ConsensusStrategy::Merge => merge(task, &successes, &failures),
        ConsensusStrategy::Vote => vote(task, &successes),
        ConsensusStrategy::Chain => chain(task, &successes),
        ConsensusStrategy::Best => best(task, &successes),
    }
}

/// Successful results ordered by the fixed role aggregation order.
fn in_role_order<'a>(successes: &[&'a AgentResult]) -> Vec<&'a AgentResult> {
    SwarmRole::AGGREGATION_ORDER
        .iter()
        .flat_map(|role| {
            successes
                .iter()
                .filter(move |r| r.role == *role)
                .copied()
                .collect::<Vec<_>>()
        })
        .collect()
}

fn merge(task: &str, successes: &[&AgentResult], failures: &[&AgentResult]) -> String {
    let mut out = format!("# Swarm Result: {task}\n\n");
    for result in in_role_order(successes) {
        let profile = result.role.profile();
        out.push_str(&format!(
            "## {} {}\n\n{}\n\n",
            profile.emoji, profile.name, result.output
        ));
    }
    if !failures.is_empty() {
        out.push_str("## Failed Agents\n\n");
        for failure in failures {
            out.push_str(&format!("- {}: {}\n", failure.role, failure.output));
        }
    }
    out
}

fn vote(task: &str, successes: &[&AgentResult]) -> String {
    let mut out = format!("# Vote Result: {task}\n\n");
    for result in in_role_order(successes) {
        let excerpt: String = result.output.chars().take(500).collect();
        out.push_str(&format!("## {}\n\n{excerpt}\n\n", result.role));
    }
    out.push_str(&format!(
        "## Consensus\n\n{} of {} agents produced output; the excerpts above \
         represent the shared direction of the swarm.\n",
        successes.len(),
        successes.len()
    ));
    out
}

fn chain(task: &str, successes: &[&AgentResult]) -> String {
    let ordered = in_role_order(successes);
    let mut out = format!("# Pipeline Result: {task}\n\n");
    for (stage, result) in ordered.iter().enumerate() {
        out.push_str(&format!(
            "## Stage {}: {}\n\n{}\n\n",
            stage + 1,
            result.role,
            result.output
        ));
    }
    if let Some(last) = ordered.last() {
        out.push_str(&format!("## Final Output\n\n{}\n", last.output));
    }
    out
}

fn best(task: &str, successes: &[&AgentResult]) -> String {
    let mut scored: Vec<(&AgentResult, f64)> = successes
        .iter()
        .map(|r| (*r, score(r)))
        .collect();
    // Highest score first; stable for equal scores.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (winner, winner_score) = scored[0];
    let profile = winner.role.profile();
    let mut out = format!("# Best Result: {task}\n\n");
    out.push_str(&format!(
        "## Selected: {} {} (score {:.1})\n\n{}\n",
        profile.emoji, winner.role, winner_score, winner.output
    ));

    if scored.len() > 1 {
        out.push_str("\n## Other Candidates\n\n");
        for (candidate, candidate_score) in &scored[1..] {
            out.push_str(&format!(
                "- {}: score {:.1}\n",
                candidate.role, candidate_score
            ));
        }
    }
    out
}

/// Quality heuristic: length, structure, and completion all count.
fn score(result: &AgentResult) -> f64 {
    let output = &result.output;
    let len = output.chars().count() as f64 * 0.1;
    let newlines = output.matches('\n').count() as f64 * 2.0;
    let headings = output
        .lines()
        .filter(|line| line.trim_start().starts_with('#'))
        .count() as f64
        * 10.0;
    let fences = (output.matches("```").count() / 2) as f64 * 5.0;
    let done_bonus = if result.status == AgentStatus::Done {
        50.0
    } else {
        0.0
    };
    len + newlines + headings + fences + done_bonus
}
