//! Swarm roles — the closed set of agent specializations.
//!
//! Eight predefined roles; consumers cannot add roles at runtime. Each
//! role carries a system prompt, tool allow patterns, and a scheduling
//! priority (lower runs first).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A role specialization within a swarm. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmRole {
    /// System design and high-level structure.
    Architect,
    /// Implementation work.
    Coder,
    /// Prior art, approaches, constraints.
    Researcher,
    /// Critique of the other agents' output.
    Reviewer,
    /// Threat assessment and hardening.
    Security,
    /// Test design and validation.
    Tester,
    /// Deployment and operations.
    Devops,
    /// Requirements and metrics analysis.
    Analyst,
}

impl fmt::Display for SwarmRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.profile().id)
    }
}

/// Static profile of a role.
#[derive(Debug, Clone)]
pub struct RoleProfile {
    /// Stable role id (the lowercase enum name).
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Emoji used in aggregated output headers.
    pub emoji: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// System prompt handed to the agent runtime.
    pub system_prompt: &'static str,
    /// Glob-ish patterns of tools this role may invoke.
    pub tool_allow: &'static [&'static str],
    /// Scheduling priority; lower runs first.
    pub priority: u8,
    /// Keywords that suggest this role for a task.
    keywords: &'static [&'static str],
}

const PROFILES: &[(SwarmRole, RoleProfile)] = &[
    (
        SwarmRole::Architect,
        RoleProfile {
            id: "architect",
            name: "Architect",
            emoji: "🏗️",
            description: "Designs the system structure and component boundaries",
            system_prompt: "You are a software architect. Produce a clear design: components, \
                            boundaries, data flow, and the tradeoffs behind each choice.",
            tool_allow: &["read_*", "search_*"],
            priority: 1,
            keywords: &["design", "architecture", "structure", "plan", "schema", "api"],
        },
    ),
    (
        SwarmRole::Coder,
        RoleProfile {
            id: "coder",
            name: "Coder",
            emoji: "💻",
            description: "Implements the core functionality",
            system_prompt: "You are a senior engineer. Implement the requested functionality \
                            with working, idiomatic code and note any assumptions.",
            tool_allow: &["read_*", "write_*", "exec_*"],
            priority: 1,
            keywords: &["implement", "code", "build", "write", "develop", "fix", "cli"],
        },
    ),
    (
        SwarmRole::Researcher,
        RoleProfile {
            id: "researcher",
            name: "Researcher",
            emoji: "🔍",
            description: "Surveys prior art, approaches, and constraints",
            system_prompt: "You are a researcher. Survey existing approaches, compare them, \
                            and summarize what applies to the task at hand.",
            tool_allow: &["read_*", "search_*", "fetch_*"],
            priority: 1,
            keywords: &["research", "investigate", "find", "explore", "compare", "survey"],
        },
    ),
    (
        SwarmRole::Security,
        RoleProfile {
            id: "security",
            name: "Security",
            emoji: "🛡️",
            description: "Assesses risks and hardening opportunities",
            system_prompt: "You are a security engineer. Identify the threat surface, rank \
                            the risks, and propose concrete mitigations.",
            tool_allow: &["read_*", "scan_*"],
            priority: 2,
            keywords: &["security", "vulnerability", "secure", "exploit", "pentest", "auth"],
        },
    ),
    (
        SwarmRole::Tester,
        RoleProfile {
            id: "tester",
            name: "Tester",
            emoji: "🧪",
            description: "Designs and runs the test plan",
            system_prompt: "You are a test engineer. Define the cases that matter, including \
                            edge cases, and report what passes and what does not.",
            tool_allow: &["read_*", "exec_*"],
            priority: 2,
            keywords: &["test", "verify", "validate", "qa", "coverage"],
        },
    ),
    (
        SwarmRole::Analyst,
        RoleProfile {
            id: "analyst",
            name: "Analyst",
            emoji: "📊",
            description: "Analyzes requirements and success metrics",
            system_prompt: "You are an analyst. Break the task into measurable requirements \
                            and define what success looks like.",
            tool_allow: &["read_*", "search_*"],
            priority: 2,
            keywords: &["analyze", "analyse", "data", "metrics", "report", "requirements"],
        },
    ),
    (
        SwarmRole::Devops,
        RoleProfile {
            id: "devops",
            name: "DevOps",
            emoji: "⚙️",
            description: "Plans packaging, deployment, and operations",
            system_prompt: "You are a DevOps engineer. Plan packaging, deployment, CI, and \
                            the operational runbook.",
            tool_allow: &["read_*", "exec_*", "deploy_*"],
            priority: 3,
            keywords: &["deploy", "docker", "kubernetes", "ci", "infrastructure", "pipeline"],
        },
    ),
    (
        SwarmRole::Reviewer,
        RoleProfile {
            id: "reviewer",
            name: "Reviewer",
            emoji: "🔎",
            description: "Reviews the other agents' output",
            system_prompt: "You are a reviewer. Critique the produced work for correctness, \
                            completeness, and clarity; list concrete fixes.",
            tool_allow: &["read_*"],
            priority: 3,
            keywords: &["review", "critique", "feedback", "audit", "check"],
        },
    ),
];

impl SwarmRole {
    /// Every role, in declaration order (architect first).
    pub const ALL: [SwarmRole; 8] = [
        SwarmRole::Architect,
        SwarmRole::Coder,
        SwarmRole::Researcher,
        SwarmRole::Reviewer,
        SwarmRole::Security,
        SwarmRole::Tester,
        SwarmRole::Devops,
        SwarmRole::Analyst,
    ];

    /// The order roles appear in aggregated output.
    pub const AGGREGATION_ORDER: [SwarmRole; 8] = [
        SwarmRole::Architect,
        SwarmRole::Researcher,
        SwarmRole::Coder,
        SwarmRole::Security,
        SwarmRole::Tester,
        SwarmRole::Devops,
        SwarmRole::Analyst,
        SwarmRole::Reviewer,
    ];

    /// The static profile for this role.
    pub fn profile(self) -> &'static RoleProfile {
        &PROFILES
            .iter()
            .find(|(role, _)| *role == self)
            .expect("every role has a profile")
            .1
    }

    /// Resolve a role from its id string.
    pub fn from_id(id: &str) -> Option<SwarmRole> {
        PROFILES
            .iter()
            .find(|(_, p)| p.id == id)
            .map(|(role, _)| *role)
    }

    /// Scheduling priority (lower runs first).
    pub fn priority(self) -> u8 {
        self.profile().priority
    }
}

/// Suggest roles for a task by keyword matching.
///
/// Scans the lowercased task text against each role's keyword set and
/// unions the matches in declaration order. Falls back to
/// `{coder, reviewer}` when nothing matches.
pub fn suggest_roles(task: &str) -> Vec<SwarmRole> {
    let text = task.to_lowercase();
    let matched: Vec<SwarmRole> = SwarmRole::ALL
        .into_iter()
        .filter(|role| {
            role.profile()
                .keywords
                .iter()
                .any(|keyword| text.contains(keyword))
        })
        .collect();

    if matched.is_empty() {
        vec![SwarmRole::Coder, SwarmRole::Reviewer]
    } else {
        matched
    }
}
