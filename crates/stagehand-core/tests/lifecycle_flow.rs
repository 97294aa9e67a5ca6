//! End-to-end task flows against the in-memory store and executor fakes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use stagehand_core::fakes::RecordingExecutor;
use stagehand_core::{
    Action, EnvironmentName, EnvironmentState, Lifecycle, ProjectDescriptor, ReleaseTag,
    RunContext, Settings, StagehandError, Task, TagPayload, TagWriter,
};
use stagehand_store::fakes::{RecordingSleeper, ScriptedVcs, VcsStep};
use stagehand_store::{
    Namespace, ReleaseLedger, RetryPolicy, StoreError, Vcs, VersionedStore,
};

const MAVEN_DESCRIPTOR: &str = r#"
build_tokens:
  DOMAIN: diy
  PROJECT: demo_app
  RELEASE: "1.0"
  PROJECT_TYPE: maven_jar_app
  MAVEN_GROUP_ID: org.example
  MAVEN_ARTIFACT_ID: demo_app
envs:
  - name: dev-1
    deploy_tag: LAST_ASSEMBLED
    packages:
      - main: demo_app-[PACKAGE_VERSION]
    env_variables:
      PORT: 8080
  - name: prod-1a
    deploy_tag: LAST_TESTED_DEV-1
    packages:
      - main: demo_app-[PACKAGE_VERSION]
substitute_files:
  - name: app.properties
"#;

const GENERIC_DESCRIPTOR: &str = r#"
build_tokens:
  DOMAIN: diy
  PROJECT: demo_app
  RELEASE: "1.0"
  PROJECT_TYPE: generic
substitute_files: []
commands:
  build:
    - make VERSION=[PACKAGE_VERSION]
"#;

const LOCKED: &str = "fatal: Unable to create '/central/.git/index.lock': File exists.";

struct Harness {
    _dir: tempfile::TempDir,
    central: PathBuf,
    work: PathBuf,
    deploy_root: PathBuf,
    store_vcs: ScriptedVcs,
    source_vcs: ScriptedVcs,
    exec: RecordingExecutor,
    sleeper: RecordingSleeper,
    index: Vec<String>,
    build_number: Option<String>,
}

impl Harness {
    fn new(descriptor: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let central = dir.path().join("central");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&central).unwrap();
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("config.yml"), descriptor).unwrap();
        std::fs::write(work.join("app.properties"), "version=[PACKAGE_VERSION]\n").unwrap();

        Self {
            deploy_root: dir.path().join("envs"),
            _dir: dir,
            central,
            work,
            store_vcs: ScriptedVcs::new(),
            source_vcs: ScriptedVcs::new(),
            exec: RecordingExecutor::new(),
            sleeper: RecordingSleeper::new(),
            index: Vec::new(),
            build_number: None,
        }
    }

    fn namespace() -> Namespace {
        Namespace::new("diy", "demo_app", "1.0")
    }

    fn store(&self) -> VersionedStore {
        VersionedStore::new(&self.central, Self::namespace(), Box::new(self.store_vcs.clone()))
            .with_retry(
                RetryPolicy::new(6, Duration::from_secs(5)),
                Box::new(self.sleeper.clone()),
            )
    }

    fn lifecycle(&self, task: Task, env: Option<&str>) -> Lifecycle {
        let settings = Settings {
            central_path: self.central.clone(),
            deploy_root: self.deploy_root.clone(),
            maven_repo: PathBuf::from("/home/ci/.m2"),
            workdir: self.work.clone(),
            build_number: self.build_number.clone(),
            ..Settings::default()
        };
        let environment = env.map(|e| e.parse::<EnvironmentName>().unwrap());
        let ctx = RunContext::new(Self::namespace(), task, environment, settings).unwrap();
        let descriptor = ProjectDescriptor::load(&self.work.join("config.yml")).unwrap();

        Lifecycle::new(
            ctx,
            descriptor,
            self.store(),
            Box::new(self.source_vcs.clone()),
            Box::new(self.exec.clone()),
        )
        .unwrap()
        .with_artifact_index(Box::new(self.index.clone()))
        .with_env_lookup(|_| None)
    }

    fn run(&self, task: Task, env: Option<&str>) -> stagehand_core::Result<stagehand_core::TaskOutcome> {
        self.lifecycle(task, env).run()
    }

    fn ns_path(&self, rel: &str) -> PathBuf {
        self.central.join("diy/demo_app-1.0").join(rel)
    }

    fn tag_file(&self, name: &str) -> PathBuf {
        self.ns_path(&format!("tags/{name}.yml"))
    }

    fn read_tag(&self, name: &str) -> TagPayload {
        let store = self.store();
        TagWriter::new(&store).read_tag(name).unwrap()
    }

    fn ledger(&self) -> ReleaseLedger {
        let text = std::fs::read_to_string(self.ns_path("meta/relhist.yml")).unwrap();
        serde_yaml::from_str(&text).unwrap()
    }

    /// Build 1.0.6 then assemble it.
    fn build_and_assemble(&mut self) -> stagehand_core::TaskOutcome {
        self.index = vec!["1.0.5".to_string()];
        self.run(Task::Build, None).unwrap();
        self.index.push("1.0.6".to_string());
        self.run(Task::Assemble, None).unwrap()
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn build_allocates_next_package_version_and_tags_last_built() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.index = ["1.0.0", "1.0.2", "1.0.5"].iter().map(|v| v.to_string()).collect();

    let outcome = h.run(Task::Build, None).unwrap();

    assert_eq!(outcome.package_version.as_deref(), Some("1.0.6"));
    assert_eq!(outcome.tag.as_deref(), Some("LAST_BUILT"));
    assert_eq!(read(&h.work.join("app.properties")), "version=1.0.6\n");
    assert_eq!(
        h.exec.executed(),
        vec![Action::shell("mvn clean install", &h.work)]
    );
    match h.read_tag("LAST_BUILT") {
        TagPayload::Build(tag) => {
            assert_eq!(tag.packages.len(), 1);
            assert_eq!(tag.packages[0].name, "demo_app");
            assert_eq!(tag.packages[0].version, "1.0.6");
        }
        other => panic!("unexpected payload {other:?}"),
    }
    // descriptor snapshot was copied into the store
    assert_eq!(read(&h.ns_path("meta/config.yml")), MAVEN_DESCRIPTOR);
}

#[test]
fn unchanged_descriptor_is_not_republished() {
    let h = Harness::new(MAVEN_DESCRIPTOR);
    h.run(Task::Build, None).unwrap();
    let commits_after_first = h.store_vcs.commit_count();
    assert_eq!(commits_after_first, 2); // config + tag

    h.run(Task::Build, None).unwrap();
    // The tag content is identical (empty index both times), so nothing at
    // all is committed the second time.
    assert_eq!(h.store_vcs.commit_count(), commits_after_first);
}

#[test]
fn transient_contention_is_absorbed_with_sleeps() {
    let h = Harness::new(MAVEN_DESCRIPTOR);
    h.store_vcs.fail_next(VcsStep::Push, LOCKED);
    h.store_vcs.fail_next(VcsStep::Push, LOCKED);

    h.run(Task::Build, None).unwrap();

    assert_eq!(h.sleeper.sleeps(), vec![Duration::from_secs(5); 2]);
    assert!(h.tag_file("LAST_BUILT").exists());
}

#[test]
fn exhausted_retries_fail_the_task_without_a_tag() {
    let h = Harness::new(MAVEN_DESCRIPTOR);
    for _ in 0..6 {
        h.store_vcs.fail_next(VcsStep::Push, LOCKED);
    }

    let err = h.run(Task::Build, None).unwrap_err();

    assert!(matches!(
        err,
        StagehandError::Store(StoreError::RetriesExhausted { attempts: 6, .. })
    ));
    assert_eq!(h.sleeper.sleeps().len(), 5);
    assert!(!h.tag_file("LAST_BUILT").exists());
}

#[test]
fn generic_project_numbers_builds_from_last_built_tag() {
    let h = Harness::new(GENERIC_DESCRIPTOR);
    let fallback_lifecycle = |h: &Harness| {
        // Generic projects without maven coordinates have no artifact index
        // of their own; drop the override to exercise the fallback.
        let settings = Settings {
            central_path: h.central.clone(),
            workdir: h.work.clone(),
            ..Settings::default()
        };
        let ctx = RunContext::new(Harness::namespace(), Task::Build, None, settings).unwrap();
        let descriptor = ProjectDescriptor::load(&h.work.join("config.yml")).unwrap();
        Lifecycle::new(
            ctx,
            descriptor,
            h.store(),
            Box::new(h.source_vcs.clone()),
            Box::new(h.exec.clone()),
        )
        .unwrap()
    };

    let first = fallback_lifecycle(&h).run().unwrap();
    let second = fallback_lifecycle(&h).run().unwrap();

    assert_eq!(first.package_version.as_deref(), Some("1.0.0"));
    assert_eq!(second.package_version.as_deref(), Some("1.0.1"));
    assert_eq!(
        h.exec.executed().last(),
        Some(&Action::shell("make VERSION=1.0.1", &h.work))
    );
}

#[test]
fn assemble_records_release_states_and_tag() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    let outcome = h.build_and_assemble();

    assert_eq!(outcome.release_version.as_deref(), Some("1.0.0"));
    assert_eq!(outcome.package_version.as_deref(), Some("1.0.6"));

    let ledger = h.ledger();
    assert_eq!(ledger.len(), 1);
    let entry = ledger.last().unwrap();
    assert_eq!(entry.version, "1.0.0");
    assert_eq!(Some(entry.revision.clone()), outcome.git_revision);

    let source_rev = h.source_vcs.head_revision(&h.work).unwrap();
    for env in ["dev-1", "prod-1a"] {
        let state: EnvironmentState =
            serde_yaml::from_str(&read(&h.ns_path(&format!("envs/{env}/state.yml")))).unwrap();
        assert_eq!(state.release_version, "1.0.0");
        assert_eq!(state.git_revision, source_rev);
        assert_eq!(state.main_package_version().unwrap(), "1.0.6");
    }

    assert_eq!(
        h.read_tag("LAST_ASSEMBLED"),
        TagPayload::Release(ReleaseTag {
            release_version: "1.0.0".to_string(),
            git_revision: entry.revision.clone(),
        })
    );
}

#[test]
fn repeated_assembles_allocate_monotonic_releases() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.build_and_assemble();
    for expected in ["1.0.1", "1.0.2", "1.0.3"] {
        let outcome = h.run(Task::Assemble, None).unwrap();
        assert_eq!(outcome.release_version.as_deref(), Some(expected));
    }
    let versions: Vec<String> = h.ledger().entries().iter().map(|e| e.version.clone()).collect();
    assert_eq!(versions, ["1.0.0", "1.0.1", "1.0.2", "1.0.3"]);
}

#[test]
fn assemble_without_a_built_package_fails() {
    let h = Harness::new(MAVEN_DESCRIPTOR);
    let err = h.run(Task::Assemble, None).unwrap_err();
    assert!(matches!(err, StagehandError::NoPackageBuilt(_)));
    assert!(!h.tag_file("LAST_ASSEMBLED").exists());
}

#[test]
fn assemble_store_failure_leaves_no_tag() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.build_and_assemble();
    let before = read(&h.tag_file("LAST_ASSEMBLED"));

    // The first commit of an assemble publishes the environment states.
    h.store_vcs
        .fail_next(VcsStep::Commit, "fatal: unable to write new index file");
    let err = h.run(Task::Assemble, None).unwrap_err();

    assert!(matches!(err, StagehandError::Store(StoreError::Vcs { .. })));
    assert_eq!(read(&h.tag_file("LAST_ASSEMBLED")), before);
    assert_eq!(h.ledger().len(), 1);
}

#[test]
fn deploy_resolves_from_tag_not_ledger_head() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.build_and_assemble();

    // A later release recorded in the ledger without moving the tag.
    let store = h.store();
    let mut ledger = h.ledger();
    ledger.append("1.0.1", "feedface").unwrap();
    let relhist = store.layout().release_history();
    store.write(&relhist, &ledger).unwrap();
    store.publish(&[relhist]).unwrap();

    let outcome = h.run(Task::Deploy, Some("dev-1")).unwrap();

    assert_eq!(outcome.tag.as_deref(), Some("LAST_DEPLOYED_DEV-1"));
    assert_eq!(outcome.release_version.as_deref(), Some("1.0.0"));
    match h.read_tag("LAST_DEPLOYED_DEV-1") {
        TagPayload::Release(tag) => assert_eq!(tag.release_version, "1.0.0"),
        other => panic!("unexpected payload {other:?}"),
    }

    let deploy_dir = h.deploy_root.join("diy/demo_app-1.0/dev-1");
    let executed = h.exec.executed();
    let deploy_steps = &executed[executed.len() - 4..];
    assert_eq!(
        deploy_steps[0],
        Action::FetchArtifact {
            coordinates: "org.example:demo_app:1.0.6".to_string(),
            repository: PathBuf::from("/home/ci/.m2"),
            dest: deploy_dir.join("demo_app-1.0.6.jar"),
        }
    );
    match &deploy_steps[3] {
        Action::WriteEnvExports { path, variables } => {
            assert_eq!(path, &deploy_dir.join("env_variables"));
            assert_eq!(variables["PORT"], "8080");
        }
        other => panic!("unexpected step {other:?}"),
    }
}

#[test]
fn test_task_tags_per_environment_and_promotes() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.build_and_assemble();
    h.run(Task::Deploy, Some("dev-1")).unwrap();

    let outcome = h.run(Task::Test, Some("dev-1")).unwrap();
    assert_eq!(outcome.tag.as_deref(), Some("LAST_TESTED_DEV-1"));
    assert!(matches!(
        h.exec.executed().last(),
        Some(Action::RunScript { script, .. }) if script == "scripts/launch_test.rb"
    ));

    // prod-1a deploys whatever dev-1 last passed tests with.
    let prod = h.run(Task::Deploy, Some("prod-1a")).unwrap();
    assert_eq!(prod.tag.as_deref(), Some("LAST_DEPLOYED_PROD-1A"));
    assert_eq!(prod.release_version.as_deref(), Some("1.0.0"));
}

#[test]
fn deploy_fault_at_any_step_leaves_no_tag() {
    for position in 0..4 {
        let mut h = Harness::new(MAVEN_DESCRIPTOR);
        h.build_and_assemble();
        let already_run = h.exec.executed().len();
        h.exec.fail_at(already_run + position);

        let err = h.run(Task::Deploy, Some("dev-1")).unwrap_err();
        assert!(matches!(err, StagehandError::ActionFailed { .. }), "position {position}");
        assert!(!h.tag_file("LAST_DEPLOYED_DEV-1").exists(), "position {position}");
    }
}

#[test]
fn failed_test_script_leaves_no_tested_tag() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.build_and_assemble();
    h.run(Task::Deploy, Some("dev-1")).unwrap();
    let already_run = h.exec.executed().len();
    h.exec.fail_at(already_run);

    let err = h.run(Task::Test, Some("dev-1")).unwrap_err();
    assert!(
        matches!(&err, StagehandError::ActionFailed { action, .. } if action.contains("launch_test.rb")),
        "{err}"
    );
    assert_eq!(h.exec.executed().len(), already_run);
    assert!(!h.tag_file("LAST_TESTED_DEV-1").exists());

    // prod-1a promotes from dev-1 test results, so it has nothing to deploy.
    assert!(matches!(
        h.run(Task::Deploy, Some("prod-1a")),
        Err(StagehandError::MissingTag { .. })
    ));
}

#[test]
fn build_fault_leaves_previous_tag_untouched() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.run(Task::Build, None).unwrap();
    let before = read(&h.tag_file("LAST_BUILT"));

    h.index = vec!["1.0.0".to_string()];
    h.exec.fail_at(h.exec.executed().len());
    assert!(h.run(Task::Build, None).is_err());
    assert_eq!(read(&h.tag_file("LAST_BUILT")), before);
}

#[test]
fn deploy_requires_tag_and_declared_environment() {
    let h = Harness::new(MAVEN_DESCRIPTOR);
    let err = h.run(Task::Deploy, Some("dev-1")).unwrap_err();
    assert!(matches!(err, StagehandError::MissingTag { tag, .. } if tag == "LAST_ASSEMBLED"));

    let err = h.run(Task::Deploy, Some("stg-1")).unwrap_err();
    assert!(matches!(err, StagehandError::UnknownEnvironment(e) if e == "stg-1"));
}

#[test]
fn deploy_fails_when_state_missing_at_tagged_revision() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.build_and_assemble();
    h.store_vcs
        .fail_next(VcsStep::Show, "fatal: path 'x' does not exist in 'abc'");

    let err = h.run(Task::Deploy, Some("dev-1")).unwrap_err();
    assert!(matches!(err, StagehandError::Store(StoreError::NotFound { .. })));
    assert!(!h.tag_file("LAST_DEPLOYED_DEV-1").exists());
}

#[test]
fn devbuild_uses_build_number_and_writes_no_tag() {
    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.build_number = Some("42".to_string());

    let outcome = h.run(Task::Devbuild, None).unwrap();

    assert_eq!(outcome.package_version.as_deref(), Some("1.0.42"));
    assert_eq!(outcome.tag, None);
    assert!(!h.ns_path("tags").exists());
    assert_eq!(h.store_vcs.commit_count(), 0);

    let executed = h.exec.executed();
    assert_eq!(executed[0], Action::shell("mvn clean package", &h.work));
    assert_eq!(
        executed[1],
        Action::Copy {
            from: h.work.join("target/demo_app_dev-1.0.42.jar"),
            to: h.deploy_root.join("diy/demo_app-1.0/dev-1/demo_app_dev-1.0.42.jar"),
        }
    );
    // only dev-* environments receive dev builds
    assert_eq!(executed.len(), 5);
}

#[test]
fn devbuild_preconditions() {
    let h = Harness::new(MAVEN_DESCRIPTOR);
    let err = h.run(Task::Devbuild, None).unwrap_err();
    assert!(matches!(err, StagehandError::MissingToken(t) if t == "BUILD_NUMBER"));

    let mut h = Harness::new(MAVEN_DESCRIPTOR);
    h.build_number = Some("7".to_string());
    h.source_vcs.set_branch(None);
    let err = h.run(Task::Devbuild, None).unwrap_err();
    assert!(matches!(err, StagehandError::Source { .. }));
    assert!(h.exec.executed().is_empty());
}
