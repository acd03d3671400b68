//! Task decomposition — one sub-task per role.
//!
//! With `auto_decompose` on, every role gets a role-flavored description
//! derived from a fixed template; off, every role receives the task
//! verbatim. Context and role priority carry through either way.

use super::agent::SubTask;
use super::roles::SwarmRole;

/// Produce one sub-task per role for `task`.
pub fn decompose(
    task: &str,
    roles: &[SwarmRole],
    context: Option<&str>,
    auto_decompose: bool,
) -> Vec<(SwarmRole, SubTask)> {
    roles
        .iter()
        .map(|&role| {
            let description = if auto_decompose {
                role_description(role, task)
            } else {
                task.to_string()
            };
            (
                role,
                SubTask {
                    description,
                    context: context.map(str::to_string),
                    depends_on: Vec::new(),
                    priority: role.priority(),
                },
            )
        })
        .collect()
}

fn role_description(role: SwarmRole, task: &str) -> String {
    match role {
        SwarmRole::Architect => {
            format!("Design the architecture and high-level structure for: {task}")
        }
        SwarmRole::Coder => format!("Implement the core functionality for: {task}"),
        SwarmRole::Researcher => {
            format!("Research approaches, prior art, and constraints for: {task}")
        }
        SwarmRole::Reviewer => {
            format!("Review the work produced by the other agents for: {task}")
        }
        SwarmRole::Security => {
            format!("Assess security risks and hardening opportunities for: {task}")
        }
        SwarmRole::Tester => format!("Design and run tests covering: {task}"),
        SwarmRole::Devops => {
            format!("Plan deployment, packaging, and operations for: {task}")
        }
        SwarmRole::Analyst => {
            format!("Analyze requirements and success metrics for: {task}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_decompose_flavors_description_per_role() {
        let roles = [SwarmRole::Architect, SwarmRole::Coder];
        let tasks = decompose("build a CLI", &roles, Some("rust project"), true);

        assert_eq!(tasks.len(), 2);
        let (role, architect) = &tasks[0];
        assert_eq!(*role, SwarmRole::Architect);
        assert!(architect.description.starts_with("Design the architecture"));
        assert!(architect.description.ends_with("build a CLI"));
        assert_eq!(architect.context.as_deref(), Some("rust project"));
        assert_eq!(architect.priority, 1);
    }

    #[test]
    fn verbatim_decompose_preserves_task_context_and_priority() {
        let tasks = decompose("exact task", &SwarmRole::ALL, Some("ctx"), false);

        assert_eq!(tasks.len(), SwarmRole::ALL.len());
        for (role, sub_task) in &tasks {
            assert_eq!(sub_task.description, "exact task");
            assert_eq!(sub_task.context.as_deref(), Some("ctx"));
            assert!(sub_task.depends_on.is_empty());
            assert_eq!(sub_task.priority, role.priority());
        }
    }
}
