use crate::action::Action;
use crate::context::{Settings, Task};
use crate::environment::Stage;
use crate::error::Result;
use crate::provider::{BuildStepProvider, ProjectType, StepContext};
use crate::tokens::{self, TokenTable};
use crate::versioning::{ArtifactIndex, MavenRepositoryIndex};

/// Test launcher packaged inside the application jar.
pub const TEST_SCRIPT: &str = "scripts/launch_test.rb";

const TEST_INTERPRETER: &str = "ruby";
const ENV_EXPORTS: &str = "env_variables";

/// A maven-built, self-contained jar application.
///
/// Each environment directory holds versioned jars and a stable
/// `<artifact>.jar` link to the deployed one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MavenJarApp;

impl MavenJarApp {
    fn jar(artifact: &str, version: &str) -> String {
        format!("{artifact}-{version}.jar")
    }

    fn link_name(artifact: &str) -> String {
        format!("{artifact}.jar")
    }
}

impl BuildStepProvider for MavenJarApp {
    fn project_type(&self) -> ProjectType {
        ProjectType::MavenJarApp
    }

    /// Dev builds publish under a separate `<artifact>_dev` name.
    fn prepare(&self, task: Task, tokens: &mut TokenTable) -> Result<()> {
        if task == Task::Devbuild {
            let dev = format!("{}_dev", tokens.get(tokens::MAVEN_ARTIFACT_ID)?);
            tokens.insert(tokens::MAVEN_ARTIFACT_ID, dev);
        }
        Ok(())
    }

    fn steps_for(&self, task: Task, ctx: &StepContext<'_>) -> Result<Vec<Action>> {
        let workdir = &ctx.settings.workdir;
        let artifact = ctx.tokens.get(tokens::MAVEN_ARTIFACT_ID)?;
        let link = Self::link_name(artifact);

        let steps = match task {
            Task::Build => vec![Action::shell("mvn clean install", workdir)],
            Task::Devbuild => {
                let version = ctx.tokens.get(tokens::PACKAGE_VERSION)?;
                let jar = Self::jar(artifact, version);
                let mut steps = vec![Action::shell("mvn clean package", workdir)];

                let dev_envs = ctx
                    .descriptor
                    .envs
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .filter(|env| {
                        env.environment_name()
                            .map(|name| name.stage == Stage::Dev)
                            .unwrap_or(false)
                    });
                for env in dev_envs {
                    let dir = ctx.deploy_dir(&env.name);
                    steps.push(Action::Copy {
                        from: workdir.join("target").join(&jar),
                        to: dir.join(&jar),
                    });
                    steps.push(Action::Link {
                        dir: dir.clone(),
                        target: jar.clone(),
                        link: link.clone(),
                    });
                    steps.push(Action::Extract {
                        dir: dir.clone(),
                        archive: link.clone(),
                        member: TEST_SCRIPT.to_string(),
                    });
                    steps.push(Action::RunScript {
                        dir,
                        interpreter: TEST_INTERPRETER.to_string(),
                        script: TEST_SCRIPT.to_string(),
                    });
                }
                steps
            }
            Task::Assemble => Vec::new(),
            Task::Deploy => {
                let env = ctx.required_environment()?;
                let state = ctx.required_state()?;
                let version = state.main_package_version()?;
                let group = ctx.tokens.get(tokens::MAVEN_GROUP_ID)?;
                let jar = Self::jar(artifact, &version);
                let dir = ctx.deploy_dir(&env.to_string());

                vec![
                    Action::FetchArtifact {
                        coordinates: format!("{group}:{artifact}:{version}"),
                        repository: ctx.settings.maven_repo.clone(),
                        dest: dir.join(&jar),
                    },
                    Action::Link {
                        dir: dir.clone(),
                        target: jar,
                        link: link.clone(),
                    },
                    Action::Extract {
                        dir: dir.clone(),
                        archive: link,
                        member: TEST_SCRIPT.to_string(),
                    },
                    Action::WriteEnvExports {
                        path: dir.join(ENV_EXPORTS),
                        variables: state.env_variables.clone(),
                    },
                ]
            }
            Task::Test => {
                let env = ctx.required_environment()?;
                vec![Action::RunScript {
                    dir: ctx.deploy_dir(&env.to_string()),
                    interpreter: TEST_INTERPRETER.to_string(),
                    script: TEST_SCRIPT.to_string(),
                }]
            }
        };
        Ok(steps)
    }

    fn artifact_index(
        &self,
        tokens: &TokenTable,
        settings: &Settings,
    ) -> Result<Option<Box<dyn ArtifactIndex>>> {
        Ok(Some(Box::new(MavenRepositoryIndex::new(
            &settings.maven_repo,
            tokens.get(tokens::MAVEN_GROUP_ID)?,
            tokens.get(tokens::MAVEN_ARTIFACT_ID)?,
        ))))
    }

    fn artifact_name(&self, tokens: &TokenTable) -> Result<String> {
        Ok(tokens.get(tokens::MAVEN_ARTIFACT_ID)?.to_string())
    }
}
