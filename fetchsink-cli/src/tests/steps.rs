//! Behaviour-driven step definitions driving the run scenarios.

use super::helpers::{RHYMES, Workspace};
use super::*;
use fetchsink_core::PipelineError;
use fetchsink_core::test_support::StubTransport;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

/// Aggregates scenario state so each step only needs a single world argument.
#[derive(Default)]
struct RunWorld {
    workspace: RefCell<Option<Workspace>>,
    transport: RefCell<Option<StubTransport>>,
    outcome: RefCell<Option<Result<RunOutcome, CliError>>>,
}

impl RunWorld {
    fn with_workspace<R>(&self, f: impl FnOnce(&mut Workspace) -> R) -> R {
        let mut workspace = self.workspace.borrow_mut();
        f(workspace.as_mut().expect("workspace should be prepared"))
    }

    fn outcome(&self) -> std::cell::Ref<'_, Result<RunOutcome, CliError>> {
        std::cell::Ref::map(self.outcome.borrow(), |outcome| {
            outcome.as_ref().expect("pipeline should have run")
        })
    }
}

#[fixture]
fn world() -> RunWorld {
    RunWorld::default()
}

#[given("a scratch workspace with the default sinks")]
fn given_workspace(world: &RunWorld) {
    world.workspace.replace(Some(Workspace::new()));
}

#[given("PostgreSQL is enabled but unreachable")]
fn given_unreachable_postgres(world: &RunWorld) {
    world.with_workspace(Workspace::enable_unreachable_postgres);
}

#[given("the API answers with two rhymes")]
fn given_rhymes(world: &RunWorld) {
    world
        .transport
        .replace(Some(StubTransport::always(StubTransport::json_response(
            200, RHYMES,
        ))));
}

#[given("the API answers with status 503")]
fn given_unavailable(world: &RunWorld) {
    world
        .transport
        .replace(Some(StubTransport::always(StubTransport::json_response(
            503, b"{}",
        ))));
}

#[when("the configured pipeline runs")]
fn when_runs(world: &RunWorld) {
    let transport = world
        .transport
        .borrow_mut()
        .take()
        .expect("transport should be configured");
    let outcome = world.with_workspace(|workspace| run_with(&workspace.config, transport));
    world.outcome.replace(Some(outcome));
}

#[then("the run is complete")]
fn then_complete(world: &RunWorld) {
    match &*world.outcome() {
        Ok(outcome) => assert_eq!(*outcome, RunOutcome::Complete),
        Err(err) => panic!("run failed unexpectedly: {err}"),
    }
}

#[then("the run is partial")]
fn then_partial(world: &RunWorld) {
    match &*world.outcome() {
        Ok(outcome) => assert_eq!(*outcome, RunOutcome::Partial),
        Err(err) => panic!("run failed unexpectedly: {err}"),
    }
}

#[then("the JSON artefact is named after the rhyme parameter")]
fn then_json_named(world: &RunWorld) {
    world.with_workspace(|workspace| {
        assert!(workspace.artefact("forgetful.json").is_file());
    });
}

#[then("the run aborts with a fetch error")]
fn then_aborts(world: &RunWorld) {
    assert!(matches!(
        &*world.outcome(),
        Err(CliError::Pipeline(PipelineError::Fetch(_)))
    ));
}

#[then("no artefacts are written")]
fn then_nothing_written(world: &RunWorld) {
    world.with_workspace(|workspace| assert!(!workspace.config.output_dir.exists()));
}

#[scenario(path = "tests/features/run_command.feature", index = 0)]
fn every_sink_succeeds(world: RunWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/run_command.feature", index = 1)]
fn unreachable_database_is_isolated(world: RunWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/run_command.feature", index = 2)]
fn failed_response_aborts(world: RunWorld) {
    let _ = world;
}
