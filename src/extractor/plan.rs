// src/extractor/plan.rs
// Ordered implementation plan derived from one processed response.

use serde::{Deserialize, Serialize};

use super::{FileModification, ShellCommand};

/// One phase of the plan with its concrete actions, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub name: String,
    pub actions: Vec<String>,
}

/// Phases run install -> files -> commands -> validation. Phases with no
/// actions are omitted except validation, which is always last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImplementationPlan {
    pub phases: Vec<PlanPhase>,
}

impl ImplementationPlan {
    pub fn phase(&self, name: &str) -> Option<&PlanPhase> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn total_actions(&self) -> usize {
        self.phases.iter().map(|p| p.actions.len()).sum()
    }
}

pub(crate) fn build_plan(
    dependencies: &[String],
    file_modifications: &[FileModification],
    commands: &[ShellCommand],
    validation_steps: &[String],
) -> ImplementationPlan {
    let mut phases = Vec::new();

    if !dependencies.is_empty() {
        phases.push(PlanPhase {
            name: "install_dependencies".to_string(),
            actions: dependencies
                .iter()
                .map(|d| format!("install {d}"))
                .collect(),
        });
    }

    if !file_modifications.is_empty() {
        phases.push(PlanPhase {
            name: "modify_files".to_string(),
            actions: file_modifications
                .iter()
                .map(|m| format!("{} {}", m.action.as_str(), m.path))
                .collect(),
        });
    }

    if !commands.is_empty() {
        phases.push(PlanPhase {
            name: "execute_commands".to_string(),
            actions: commands.iter().map(|c| c.command.clone()).collect(),
        });
    }

    // Always present, even with nothing explicit to validate
    let validation_actions = if validation_steps.is_empty() {
        vec!["review the changes manually".to_string()]
    } else {
        validation_steps.to_vec()
    };
    phases.push(PlanPhase {
        name: "validation".to_string(),
        actions: validation_actions,
    });

    ImplementationPlan { phases }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{CommandCategory, FileAction};

    #[test]
    fn test_phase_ordering() {
        let plan = build_plan(
            &["serde".to_string()],
            &[FileModification {
                path: "src/lib.rs".into(),
                action: FileAction::Modify,
                code: None,
            }],
            &[ShellCommand {
                command: "cargo build".into(),
                category: CommandCategory::Execution,
            }],
            &["verify the build passes".to_string()],
        );

        let names: Vec<&str> = plan.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "install_dependencies",
                "modify_files",
                "execute_commands",
                "validation"
            ]
        );
    }

    #[test]
    fn test_empty_phases_omitted_validation_kept() {
        let plan = build_plan(&[], &[], &[], &[]);
        assert_eq!(plan.phases.len(), 1);
        assert_eq!(plan.phases[0].name, "validation");
        assert!(!plan.phases[0].actions.is_empty());
    }

    #[test]
    fn test_action_rendering() {
        let plan = build_plan(
            &["axum".to_string()],
            &[FileModification {
                path: "src/main.rs".into(),
                action: FileAction::Create,
                code: Some("fn main() {}".into()),
            }],
            &[],
            &[],
        );
        assert_eq!(plan.phase("install_dependencies").unwrap().actions[0], "install axum");
        assert_eq!(plan.phase("modify_files").unwrap().actions[0], "create src/main.rs");
    }
}
