//! Pipeline, stage and action definitions.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::{Error, Result};

/// A delivery pipeline definition.
///
/// Stage order is fixed when the pipeline is defined and never changes at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name (e.g., "docs-pipeline"). Also the pipeline's identity.
    pub name: String,
    /// Stages, executed strictly in this order.
    pub stages: Vec<Stage>,
}

/// A barrier grouping actions that run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<ActionSpec>,
}

/// A unit of pipeline work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Action name (e.g., "docs-buildaction").
    pub name: String,
    /// What this action does.
    pub kind: ActionKind,
    /// Artifact consumed by this action, produced by an earlier stage.
    pub input: Option<String>,
    /// Artifacts this action populates.
    pub outputs: Vec<String>,
    /// Sibling action in the same stage whose success this action waits for.
    pub after: Option<String>,
    /// Upper bound on the action's run time.
    pub timeout: Option<Duration>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            input: None,
            outputs: Vec::new(),
            after: None,
            timeout: None,
        }
    }

    pub fn with_input(mut self, artifact: impl Into<String>) -> Self {
        self.input = Some(artifact.into());
        self
    }

    pub fn with_output(mut self, artifact: impl Into<String>) -> Self {
        self.outputs.push(artifact.into());
        self
    }

    pub fn after(mut self, sibling: impl Into<String>) -> Self {
        self.after = Some(sibling.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Kind of work an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Fetch the triggering revision from the source repository.
    SourceFetch,
    /// Run the site build against a source artifact.
    Build,
    /// Copy a build artifact into the object store.
    Deploy,
    /// Invoke the edge cache invalidation.
    Invoke,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::SourceFetch => "source-fetch",
            ActionKind::Build => "build",
            ActionKind::Deploy => "deploy",
            ActionKind::Invoke => "invoke",
        };
        f.write_str(s)
    }
}

/// Status of a single action within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Succeeded,
    Failed { message: String },
    /// Never dispatched because its completion dependency failed.
    Skipped { reason: String },
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Succeeded | ActionStatus::Failed { .. } | ActionStatus::Skipped { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionStatus::Succeeded)
    }
}

/// Association between a site and the edge distribution fronting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBinding {
    /// Site host name (e.g., "docs.example.com").
    pub site: String,
    /// Distribution identity at the CDN provider.
    pub distribution_id: String,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, name: impl Into<String>, actions: Vec<ActionSpec>) -> Self {
        self.stages.push(Stage {
            name: name.into(),
            actions,
        });
        self
    }

    /// Index of the last stage. Cancellation is refused once it is entered.
    pub fn final_stage_index(&self) -> Option<usize> {
        self.stages.len().checked_sub(1)
    }

    /// All artifact names declared as outputs, in declaration order.
    pub fn declared_artifacts(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .flat_map(|a| a.outputs.iter().map(String::as_str))
            .collect()
    }

    /// Check the stage/action graph for structural errors.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidInput("pipeline name is empty".to_string()));
        }
        if self.stages.is_empty() {
            return Err(Error::InvalidInput(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }

        let mut stage_names = HashSet::new();
        let mut action_names = HashSet::new();
        // Artifacts produced by stages before the one being checked.
        let mut available: HashSet<&str> = HashSet::new();
        let mut producers: HashMap<&str, &str> = HashMap::new();

        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "duplicate stage '{}'",
                    stage.name
                )));
            }
            if stage.actions.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "stage '{}' has no actions",
                    stage.name
                )));
            }

            let siblings: HashSet<&str> = stage.actions.iter().map(|a| a.name.as_str()).collect();

            for action in &stage.actions {
                if !action_names.insert(action.name.as_str()) {
                    return Err(Error::InvalidInput(format!(
                        "duplicate action '{}'",
                        action.name
                    )));
                }

                if let Some(input) = &action.input {
                    if !available.contains(input.as_str()) {
                        return Err(Error::InvalidInput(format!(
                            "action '{}' consumes '{}' which no earlier stage produces",
                            action.name, input
                        )));
                    }
                }

                for output in &action.outputs {
                    if let Some(existing) = producers.insert(output.as_str(), action.name.as_str()) {
                        return Err(Error::InvalidInput(format!(
                            "artifact '{}' is produced by both '{}' and '{}'",
                            output, existing, action.name
                        )));
                    }
                }

                if let Some(after) = &action.after {
                    if after == &action.name || !siblings.contains(after.as_str()) {
                        return Err(Error::InvalidInput(format!(
                            "action '{}' waits for '{}' which is not a sibling in stage '{}'",
                            action.name, after, stage.name
                        )));
                    }
                }
            }

            detect_after_cycle(stage)?;

            available.extend(
                stage
                    .actions
                    .iter()
                    .flat_map(|a| a.outputs.iter().map(String::as_str)),
            );
        }

        Ok(())
    }
}

/// Completion dependencies form chains within a stage; a cycle would deadlock it.
fn detect_after_cycle(stage: &Stage) -> Result<()> {
    let after: HashMap<&str, &str> = stage
        .actions
        .iter()
        .filter_map(|a| a.after.as_deref().map(|dep| (a.name.as_str(), dep)))
        .collect();

    for start in after.keys() {
        let mut seen = HashSet::new();
        let mut current = *start;
        while let Some(next) = after.get(current) {
            if !seen.insert(current) {
                return Err(Error::InvalidInput(format!(
                    "completion dependencies in stage '{}' form a cycle through '{}'",
                    stage.name, current
                )));
            }
            current = next;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_pipeline() -> Pipeline {
        Pipeline::new("docs-pipeline")
            .stage(
                "source",
                vec![ActionSpec::new("fetch", ActionKind::SourceFetch).with_output("source")],
            )
            .stage(
                "build",
                vec![
                    ActionSpec::new("build", ActionKind::Build)
                        .with_input("source")
                        .with_output("site"),
                ],
            )
            .stage(
                "deploy",
                vec![
                    ActionSpec::new("deploy", ActionKind::Deploy).with_input("site"),
                    ActionSpec::new("invalidate", ActionKind::Invoke).after("deploy"),
                ],
            )
    }

    #[test]
    fn test_valid_site_pipeline() {
        let pipeline = site_pipeline();
        pipeline.validate().unwrap();
        assert_eq!(pipeline.final_stage_index(), Some(2));
        assert_eq!(pipeline.declared_artifacts(), vec!["source", "site"]);
    }

    #[test]
    fn test_input_must_come_from_earlier_stage() {
        let pipeline = Pipeline::new("p").stage(
            "only",
            vec![
                ActionSpec::new("a", ActionKind::Build).with_output("x"),
                ActionSpec::new("b", ActionKind::Deploy).with_input("x"),
            ],
        );
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("no earlier stage produces"));
    }

    #[test]
    fn test_single_writer_per_artifact() {
        let pipeline = Pipeline::new("p")
            .stage(
                "one",
                vec![ActionSpec::new("a", ActionKind::SourceFetch).with_output("x")],
            )
            .stage(
                "two",
                vec![ActionSpec::new("b", ActionKind::Build).with_output("x")],
            );
        assert!(matches!(pipeline.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_after_must_name_sibling() {
        let pipeline = Pipeline::new("p")
            .stage(
                "one",
                vec![ActionSpec::new("a", ActionKind::SourceFetch).with_output("x")],
            )
            .stage(
                "two",
                vec![ActionSpec::new("b", ActionKind::Invoke).after("a")],
            );
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("not a sibling"));
    }

    #[test]
    fn test_after_cycle_rejected() {
        let pipeline = Pipeline::new("p").stage(
            "one",
            vec![
                ActionSpec::new("a", ActionKind::Invoke).after("b"),
                ActionSpec::new("b", ActionKind::Invoke).after("a"),
            ],
        );
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_empty_stage_rejected() {
        let pipeline = Pipeline::new("p").stage("empty", vec![]);
        assert!(pipeline.validate().is_err());
        assert!(Pipeline::new("p").validate().is_err());
    }
}
