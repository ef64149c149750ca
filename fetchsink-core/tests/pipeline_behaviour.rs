//! Behavioural tests for `Pipeline` sink isolation using rstest-bdd.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fetchsink_core::{
    ArtefactPath, Connection, ConnectionError, ConnectionHandle, ConnectionManager, Payload,
    PersistError, PersistOutcome, Pipeline, PipelineError, RawResponse, Record, RelationalSink,
    RequestSpec, RunReport, Sink, SinkContext, SinkTarget, Table, Transport, TransportError,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

struct CannedTransport {
    result: Result<RawResponse, TransportError>,
}

impl Transport for CannedTransport {
    fn fetch(&self, _request: &RequestSpec) -> Result<RawResponse, TransportError> {
        self.result.clone()
    }
}

struct BrokenSink;

impl Sink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    fn target(&self) -> SinkTarget {
        SinkTarget::file(ArtefactPath::Fixed("out/words.parquet".into()))
    }

    fn persist(
        &self,
        _payload: &Payload,
        _ctx: &mut SinkContext<'_>,
    ) -> Result<PersistOutcome, PersistError> {
        Err(PersistError::UnsupportedFormat {
            path: "out/words.parquet".into(),
        })
    }
}

struct RecordingSink {
    seen: Rc<RefCell<Vec<String>>>,
}

impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn target(&self) -> SinkTarget {
        SinkTarget::file(ArtefactPath::derived("out", None))
    }

    fn persist(
        &self,
        _payload: &Payload,
        ctx: &mut SinkContext<'_>,
    ) -> Result<PersistOutcome, PersistError> {
        let name = ctx.identifier().file_name();
        self.seen.borrow_mut().push(name.clone());
        Ok(PersistOutcome::Created {
            path: format!("out/{name}").into(),
        })
    }
}

#[derive(Clone, Default)]
struct Counters {
    opens: Rc<Cell<usize>>,
    closes: Rc<Cell<usize>>,
}

struct CountingManager {
    counters: Counters,
}

struct CountingConnection {
    counters: Counters,
}

impl ConnectionManager for CountingManager {
    fn describe(&self) -> String {
        "counting store".to_owned()
    }

    fn open(&self) -> Result<ConnectionHandle, ConnectionError> {
        self.counters.opens.set(self.counters.opens.get() + 1);
        Ok(ConnectionHandle::new(
            self.describe(),
            Box::new(CountingConnection {
                counters: self.counters.clone(),
            }),
        ))
    }
}

impl Connection for CountingConnection {
    fn append(&mut self, _table: &str, rows: &Table) -> Result<usize, PersistError> {
        Ok(rows.len())
    }

    fn read_table(&mut self, _table: &str) -> Result<Vec<Record>, PersistError> {
        Ok(Vec::new())
    }

    fn close(self: Box<Self>) -> Result<(), ConnectionError> {
        self.counters.closes.set(self.counters.closes.get() + 1);
        Ok(())
    }
}

/// Shared state for pipeline scenarios.
#[derive(Default)]
struct PipelineWorld {
    transport: RefCell<Option<CannedTransport>>,
    sinks: RefCell<Vec<Box<dyn Sink>>>,
    store: RefCell<Option<Counters>>,
    seen: Rc<RefCell<Vec<String>>>,
    outcome: RefCell<Option<Result<RunReport, PipelineError>>>,
}

impl PipelineWorld {
    fn with_report(&self, check: impl FnOnce(&RunReport)) {
        let outcome = self.outcome.borrow();
        match outcome.as_ref().expect("pipeline should have run") {
            Ok(report) => check(report),
            Err(err) => panic!("run failed unexpectedly: {err}"),
        }
    }
}

#[fixture]
fn world() -> PipelineWorld {
    PipelineWorld::default()
}

#[given("a transport answering rhymes for forgetful")]
fn given_rhymes(world: &PipelineWorld) {
    world.transport.replace(Some(CannedTransport {
        result: Ok(RawResponse {
            url: "https://api.datamuse.com/words?rel_rhy=forgetful".to_owned(),
            status: 200,
            content_type: Some("application/json".to_owned()),
            body: br#"[{"word": "regretful", "score": 1393}]"#.to_vec(),
        }),
    }));
}

#[given("a transport that refuses connections")]
fn given_refusing(world: &PipelineWorld) {
    world.transport.replace(Some(CannedTransport {
        result: Err(TransportError::Network {
            url: "https://api.datamuse.com/words".to_owned(),
            message: "connection refused".to_owned(),
        }),
    }));
}

#[given("a failing sink followed by a recording sink")]
fn given_sinks(world: &PipelineWorld) {
    let mut sinks = world.sinks.borrow_mut();
    sinks.push(Box::new(BrokenSink));
    sinks.push(Box::new(RecordingSink {
        seen: Rc::clone(&world.seen),
    }));
}

#[given("a relational sink on a counting store")]
fn given_relational(world: &PipelineWorld) {
    world.store.replace(Some(Counters::default()));
    world
        .sinks
        .borrow_mut()
        .push(Box::new(RelationalSink::new("sql", "store", "words")));
}

#[when("the pipeline runs")]
fn when_runs(world: &PipelineWorld) {
    let transport = world
        .transport
        .borrow_mut()
        .take()
        .expect("transport should be configured");
    let mut builder = Pipeline::builder(transport);
    if let Some(counters) = world.store.borrow().clone() {
        builder = builder.connection("store", CountingManager { counters });
    }
    for sink in world.sinks.borrow_mut().drain(..) {
        builder = builder.sink(sink);
    }
    let request =
        RequestSpec::new("https://api.datamuse.com/words").with_param("rel_rhy", "forgetful");
    let outcome = builder.build().run(&request);
    world.outcome.replace(Some(outcome));
}

#[then("the failing sink is reported as failed")]
fn then_failed(world: &PipelineWorld) {
    world.with_report(|report| {
        let sink = report.sink("broken").expect("broken sink reported");
        assert!(!sink.status.is_success());
    });
}

#[then("the recording sink is reported as succeeded")]
fn then_succeeded(world: &PipelineWorld) {
    world.with_report(|report| {
        let sink = report.sink("recording").expect("recording sink reported");
        assert!(sink.status.is_success());
    });
}

#[then("the recording sink received forgetful.json")]
fn then_received(world: &PipelineWorld) {
    assert_eq!(*world.seen.borrow(), vec!["forgetful.json".to_owned()]);
}

#[then("the run fails with a fetch error")]
fn then_fetch_error(world: &PipelineWorld) {
    let outcome = world.outcome.borrow();
    assert!(matches!(
        outcome.as_ref().expect("pipeline should have run"),
        Err(PipelineError::Fetch(TransportError::Network { .. }))
    ));
}

#[then("no sink was invoked")]
fn then_no_sink(world: &PipelineWorld) {
    assert!(world.seen.borrow().is_empty());
}

#[then("the store was opened once and closed once")]
fn then_store_balanced(world: &PipelineWorld) {
    world.with_report(|report| assert!(report.all_succeeded()));
    let store = world.store.borrow();
    let counters = store.as_ref().expect("store configured");
    assert_eq!(counters.opens.get(), 1);
    assert_eq!(counters.closes.get(), 1);
}

#[scenario(path = "tests/features/pipeline.feature", index = 0)]
fn failing_sink_is_isolated(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 1)]
fn fetch_failure_aborts(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 2)]
fn connections_released(world: PipelineWorld) {
    let _ = world;
}
