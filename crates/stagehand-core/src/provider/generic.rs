use crate::action::Action;
use crate::context::{Settings, Task};
use crate::error::Result;
use crate::provider::{BuildStepProvider, ProjectType, StepContext};
use crate::substitute::expand_placeholders;
use crate::tokens::{self, TokenTable};
use crate::versioning::{ArtifactIndex, MavenRepositoryIndex};

/// Runs the descriptor's `commands` for each task, with `[TOKEN]`
/// placeholders expanded, in the project work dir.
///
/// Deploy additionally writes the environment's variables as an export
/// file in the deploy directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericProject;

impl BuildStepProvider for GenericProject {
    fn project_type(&self) -> ProjectType {
        ProjectType::Generic
    }

    fn steps_for(&self, task: Task, ctx: &StepContext<'_>) -> Result<Vec<Action>> {
        let mut steps: Vec<Action> = ctx
            .descriptor
            .commands_for(task.name())
            .iter()
            .map(|cmd| Action::shell(expand_placeholders(cmd, ctx.tokens), &ctx.settings.workdir))
            .collect();

        if task == Task::Deploy {
            let env = ctx.required_environment()?;
            let state = ctx.required_state()?;
            steps.push(Action::WriteEnvExports {
                path: ctx.deploy_dir(&env.to_string()).join("env_variables"),
                variables: state.env_variables.clone(),
            });
        }
        Ok(steps)
    }

    /// The local maven repository when the project declares maven
    /// coordinates; otherwise none.
    fn artifact_index(
        &self,
        tokens: &TokenTable,
        settings: &Settings,
    ) -> Result<Option<Box<dyn ArtifactIndex>>> {
        match (
            tokens.lookup(tokens::MAVEN_GROUP_ID),
            tokens.lookup(tokens::MAVEN_ARTIFACT_ID),
        ) {
            (Some(group), Some(artifact)) => Ok(Some(Box::new(MavenRepositoryIndex::new(
                &settings.maven_repo,
                group,
                artifact,
            )))),
            _ => Ok(None),
        }
    }

    fn artifact_name(&self, tokens: &TokenTable) -> Result<String> {
        Ok(tokens.get(tokens::PROJECT)?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ProjectDescriptor;
    use stagehand_store::Namespace;

    const DESCRIPTOR: &str = r#"
build_tokens:
  DOMAIN: diy
  PROJECT: tool
  RELEASE: "2.1"
  PROJECT_TYPE: generic
commands:
  build:
    - make VERSION=[PACKAGE_VERSION]
    - make check
"#;

    #[test]
    fn build_commands_expand_tokens() {
        let descriptor = ProjectDescriptor::from_yaml(DESCRIPTOR).unwrap();
        let mut tokens = descriptor.tokens();
        tokens.insert(tokens::PACKAGE_VERSION, "2.1.4");
        let settings = Settings::default();
        let ns = Namespace::new("diy", "tool", "2.1");
        let ctx = StepContext {
            namespace: &ns,
            descriptor: &descriptor,
            tokens: &tokens,
            settings: &settings,
            environment: None,
            state: None,
        };

        let steps = GenericProject.steps_for(Task::Build, &ctx).unwrap();
        assert_eq!(
            steps,
            vec![
                Action::shell("make VERSION=2.1.4", &settings.workdir),
                Action::shell("make check", &settings.workdir),
            ]
        );
        assert!(GenericProject.steps_for(Task::Assemble, &ctx).unwrap().is_empty());
        assert_eq!(GenericProject.artifact_name(&tokens).unwrap(), "tool");
        assert!(GenericProject
            .artifact_index(&tokens, &settings)
            .unwrap()
            .is_none());
    }
}
