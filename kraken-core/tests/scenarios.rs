// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! End-to-end tests driving `Context`/`TaskGraph`/`Executor` together, one per scenario from the
//! design's testable-properties list: linear wiring, default selection, optional pruning, group
//! trimming, cycle detection, failure propagation, bounded parallelism, and error wrapping.

use std::sync::{Arc, Mutex};

use kraken_core::task::{PropertySchemaEntry, Schema, TaskHandle, TaskLogic, TaskStatus};
use kraken_core::value::ValueType;
use kraken_core::{Context, Error, ErrorPolicy};

/// Writes a constant string to one output property and records its own name in a shared log.
struct Producer {
    log: Arc<Mutex<Vec<String>>>,
    output: &'static str,
    value: &'static str,
}

impl TaskLogic for Producer {
    fn schema(&self) -> Vec<PropertySchemaEntry> {
        Schema::new().output(self.output, ValueType::String).build()
    }

    fn execute(&self, task: &TaskHandle) -> kraken_core::Result<TaskStatus> {
        task.output(self.output).set(self.value)?;
        self.log.lock().unwrap().push(task.name());
        Ok(TaskStatus::Succeeded)
    }
}

/// Reads one input property, asserts its value, and records its own name in a shared log.
struct Consumer {
    log: Arc<Mutex<Vec<String>>>,
    input: &'static str,
    expect: &'static str,
}

impl TaskLogic for Consumer {
    fn schema(&self) -> Vec<PropertySchemaEntry> {
        Schema::new().input(self.input, ValueType::String).build()
    }

    fn execute(&self, task: &TaskHandle) -> kraken_core::Result<TaskStatus> {
        let observed = task.input(self.input).get()?;
        assert_eq!(observed, kraken_core::Value::String(self.expect.to_string()));
        self.log.lock().unwrap().push(task.name());
        Ok(TaskStatus::Succeeded)
    }
}

/// Succeeds immediately, recording its own name.
struct Noop {
    log: Arc<Mutex<Vec<String>>>,
}

impl TaskLogic for Noop {
    fn schema(&self) -> Vec<PropertySchemaEntry> {
        Schema::new().build()
    }

    fn execute(&self, task: &TaskHandle) -> kraken_core::Result<TaskStatus> {
        self.log.lock().unwrap().push(task.name());
        Ok(TaskStatus::Succeeded)
    }
}

/// Always fails with a fixed message.
struct AlwaysFails;

impl TaskLogic for AlwaysFails {
    fn schema(&self) -> Vec<PropertySchemaEntry> {
        Schema::new().build()
    }

    fn execute(&self, _task: &TaskHandle) -> kraken_core::Result<TaskStatus> {
        Ok(TaskStatus::Failed("boom".to_string()))
    }
}

fn status_of<'a>(report: &'a kraken_core::ExecutionReport, task: &str) -> &'a TaskStatus {
    &report.results.iter().find(|r| r.task == task).unwrap_or_else(|| panic!("no result for {task}")).status
}

#[test]
fn linear_wiring_orders_producer_before_consumer() {
    let ctx = Context::new("/tmp/kraken-test-linear");
    let root = ctx.root_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    let producer = root
        .do_task("producer", Producer { log: log.clone(), output: "path", value: "out.txt" })
        .unwrap();
    root.task_builder("consumer", Consumer { log: log.clone(), input: "path", expect: "out.txt" })
        .property("path", producer.output("path"))
        .build()
        .unwrap();

    let report = ctx.execute(&[":consumer"]).unwrap();
    assert!(report.succeeded());
    assert_eq!(*log.lock().unwrap(), vec!["producer", "consumer"]);
}

#[test]
fn empty_selection_falls_back_to_default_tasks() {
    let ctx = Context::new("/tmp/kraken-test-default");
    let root = ctx.root_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    root.task_builder("a", Noop { log: log.clone() }).default_task(true).build().unwrap();
    root.task_builder("b", Noop { log: log.clone() }).default_task(false).build().unwrap();

    let report = ctx.execute(&[]).unwrap();
    assert!(report.succeeded());
    assert_eq!(*log.lock().unwrap(), vec!["a"]);
}

#[test]
fn non_strict_dependency_is_pruned_when_not_otherwise_required() {
    let ctx = Context::new("/tmp/kraken-test-non-strict");
    let root = ctx.root_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    let b = root.do_task("b", Noop { log: log.clone() }).unwrap();
    let a = root.do_task("a", Noop { log: log.clone() }).unwrap();
    a.add_relationship(&b, false);

    let report = ctx.execute(&[":a"]).unwrap();
    assert!(report.succeeded());
    assert_eq!(report.results.len(), 1);
    assert_eq!(*log.lock().unwrap(), vec!["a"]);
}

#[test]
fn group_task_is_trimmed_and_members_run_in_dependency_order() {
    let ctx = Context::new("/tmp/kraken-test-group");
    let root = ctx.root_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    let link = root.do_task("link", Noop { log: log.clone() }).unwrap();
    let compile = root.do_task("compile", Noop { log: log.clone() }).unwrap();
    compile.depends_on(&link);

    let build = root.group("build").unwrap();
    build.depends_on(&compile);
    build.depends_on(&link);

    let report = ctx.execute(&[":build"]).unwrap();
    assert!(report.succeeded());
    assert!(!report.results.iter().any(|r| r.task == ":build"), "group task must not appear in the report");
    assert_eq!(*log.lock().unwrap(), vec!["link", "compile"]);
}

#[test]
fn cycle_is_detected_before_any_task_runs() {
    let ctx = Context::new("/tmp/kraken-test-cycle");
    let root = ctx.root_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    let a = root.do_task("a", Noop { log: log.clone() }).unwrap();
    let b = root.do_task("b", Noop { log: log.clone() }).unwrap();
    a.depends_on(&b);
    b.depends_on(&a);

    let err = ctx.execute(&[":a"]).unwrap_err();
    assert!(matches!(err, Error::CycleDetected { .. }), "expected CycleDetected, got {err:?}");
    assert!(log.lock().unwrap().is_empty(), "no task should run once a cycle is detected");
}

#[test]
fn failed_dependency_skips_its_dependent() {
    let ctx = Context::new("/tmp/kraken-test-failure");
    let root = ctx.root_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    root.do_task("a", AlwaysFails).unwrap();
    let b = root.do_task("b", Noop { log: log.clone() }).unwrap();
    b.depends_on("a");

    let report = ctx.execute(&[":b"]).unwrap();
    assert!(!report.succeeded());
    assert_eq!(*status_of(&report, ":a"), TaskStatus::Failed("boom".to_string()));
    match status_of(&report, ":b") {
        TaskStatus::Skipped(reason) => assert!(reason.contains("upstream failed")),
        other => panic!("expected b to be skipped, got {other:?}"),
    }
    assert!(log.lock().unwrap().is_empty(), "b must not have executed");
}

#[test]
fn keep_going_still_runs_an_independent_task_after_a_failure() {
    let ctx = Context::new("/tmp/kraken-test-keep-going");
    let root = ctx.root_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    root.do_task("a", AlwaysFails).unwrap();
    let b = root.do_task("b", Noop { log: log.clone() }).unwrap();
    b.depends_on("a");
    root.do_task("c", Noop { log: log.clone() }).unwrap();

    let report = ctx.execute_with_policy(&[":b", ":c"], ErrorPolicy::KeepGoing, 1).unwrap();
    assert!(!report.succeeded());
    assert_eq!(*status_of(&report, ":a"), TaskStatus::Failed("boom".to_string()));
    assert_eq!(*status_of(&report, ":c"), TaskStatus::Succeeded);
    assert_eq!(*log.lock().unwrap(), vec!["c"]);
}

#[test]
fn parallel_executor_runs_independent_tasks_to_completion() {
    let ctx = Context::new("/tmp/kraken-test-parallel");
    let root = ctx.root_project();
    let log = Arc::new(Mutex::new(Vec::new()));

    let producer = root
        .do_task("producer", Producer { log: log.clone(), output: "path", value: "out.txt" })
        .unwrap();
    root.task_builder("consumer", Consumer { log: log.clone(), input: "path", expect: "out.txt" })
        .property("path", producer.output("path"))
        .build()
        .unwrap();
    root.do_task("independent", Noop { log: log.clone() }).unwrap();

    let report = ctx.execute_with_policy(&[":consumer", ":independent"], ErrorPolicy::HaltOnFailure, 4).unwrap();
    assert!(report.succeeded());
    assert_eq!(report.results.len(), 3);

    let observed = log.lock().unwrap().clone();
    let producer_idx = observed.iter().position(|t| t == "producer").unwrap();
    let consumer_idx = observed.iter().position(|t| t == "consumer").unwrap();
    assert!(producer_idx < consumer_idx, "producer must still precede consumer under parallelism");
}

/// Propagates a kernel `Error` via `?` instead of returning `TaskStatus::Failed` directly.
struct PropagatesError;

impl TaskLogic for PropagatesError {
    fn schema(&self) -> Vec<PropertySchemaEntry> {
        Schema::new().input("missing", ValueType::String).build()
    }

    fn execute(&self, task: &TaskHandle) -> kraken_core::Result<TaskStatus> {
        task.input("missing").get()?;
        Ok(TaskStatus::Succeeded)
    }
}

#[test]
fn propagated_error_is_wrapped_with_the_failing_tasks_path() {
    let ctx = Context::new("/tmp/kraken-test-propagated-error");
    let root = ctx.root_project();
    root.do_task("a", PropagatesError).unwrap();

    let report = ctx.execute(&[":a"]).unwrap();
    assert!(!report.succeeded());
    match status_of(&report, ":a") {
        TaskStatus::Failed(message) => {
            assert!(message.contains(":a"), "expected the failing task's path in the message, got {message}");
            assert!(
                message.contains("was read before being set"),
                "expected the underlying error's message, got {message}"
            );
        }
        other => panic!("expected a to fail, got {other:?}"),
    }
}

#[test]
fn selector_resolution_is_idempotent() {
    let build = || {
        let ctx = Context::new("/tmp/kraken-test-idempotent");
        let root = ctx.root_project();
        let log = Arc::new(Mutex::new(Vec::new()));
        let producer = root
            .do_task("producer", Producer { log: log.clone(), output: "path", value: "out.txt" })
            .unwrap();
        root.task_builder("consumer", Consumer { log: log.clone(), input: "path", expect: "out.txt" })
            .property("path", producer.output("path"))
            .build()
            .unwrap();
        (ctx, log)
    };

    let (ctx_once, log_once) = build();
    ctx_once.execute(&[":consumer"]).unwrap();

    let (ctx_twice, log_twice) = build();
    ctx_twice.execute(&[":consumer", ":consumer"]).unwrap();

    assert_eq!(*log_once.lock().unwrap(), *log_twice.lock().unwrap());
}

struct PathConsumer;

impl TaskLogic for PathConsumer {
    fn schema(&self) -> Vec<PropertySchemaEntry> {
        Schema::new().input("src", ValueType::Path).build()
    }

    fn execute(&self, _task: &TaskHandle) -> kraken_core::Result<TaskStatus> {
        Ok(TaskStatus::Succeeded)
    }
}

#[test]
fn property_set_coerces_strings_through_the_path_adapter() {
    let ctx = Context::new("/tmp/kraken-test-round-trip");
    let root = ctx.root_project();

    let task = root.do_task("a", PathConsumer).unwrap();
    task.input("src").set("out.txt").unwrap();

    assert_eq!(task.input("src").get().unwrap(), kraken_core::Value::Path(std::path::PathBuf::from("out.txt")));
}
