//! A number of minimal mocking tests for the basic functionality of the executor.
//!
//! Most of these tests are written by an LLM. They are very small tests, so
//! it's acceptable.

use kati::exec::{ExecConfig, Executor};
use kati::progress::NOOP_PROGRESS;

use test_log::test;

use crate::mock::MockWorld;

mod mock;

// Helper functions

fn run_graph(world: &MockWorld, graph: &kati::DepGraph, cfg: ExecConfig, want: impl IntoIterator<Item = kati::DepId>) -> Vec<String> {
    let mut exec = Executor::with_world(&cfg, graph, world, &*NOOP_PROGRESS);
    exec.want(want);
    exec.run().unwrap();
    world.take_log()
}

fn touch_all(world: &MockWorld, files: &[&str]) {
    for f in files {
        world.touch_file(f);
    }
}

fn set_fail_on(world: &MockWorld, exec_name: &str) {
    let name = exec_name.to_string();
    world.set_callback(Box::new(move |cmd| cmd == name));
}

fn set_fail_on_any(world: &MockWorld, exec_names: &[&str]) {
    let names: Vec<String> = exec_names.iter().map(|s| s.to_string()).collect();
    world.set_callback(Box::new(move |cmd| names.iter().any(|n| n == cmd)));
}

fn assert_log_include(log: &[String], expected: &[&str]) {
    for e in expected {
        assert!(log.contains(&e.to_string()), "Expected log to include {}. Got {:?}", e, log);
    }
}

fn assert_order(log: &[String], before: &str, after: &str) {
    let b = log.iter().position(|l| l == before).unwrap_or_else(|| panic!("Expected '{}' in log {:?}", before, log));
    let a = log.iter().position(|l| l == after).unwrap_or_else(|| panic!("Expected '{}' in log {:?}", after, log));
    assert!(b < a, "Expected '{}' to execute before '{}'. Got {:?}", before, after, log);
}

/// Builds a [`kati::DepGraph`] from a terse `target => CMD(inputs...)` list.
/// Each rule's recipe is synthesized as `[CMD, "touch <target>"]`, so a
/// successful run marks its target as freshly written the way a real
/// recipe's shell commands would. `dep(...)` is accepted but unused: the
/// dependency is already implied by an input name matching another rule's
/// output.
macro_rules! mock_graph {
    (
        $(
            $id:ident $(, dep($($dep:ident),* $(,)?))? : $out:expr => $cmd:ident ($($in:expr),* $(,)?) ;
        )*
    ) => {{
        #[allow(unused)]
        struct MockContext {
            graph: kati::DepGraph,
            $($id: kati::DepId,)*
        }

        let mut __gb = kati::GraphBuilder::new();
        let mut __roots: Vec<smol_str::SmolStr> = Vec::new();
        $(
            let __ins: Vec<smol_str::SmolStr> = vec![$(smol_str::SmolStr::new($in)),*];
            let __recipe: Vec<smol_str::SmolStr> = vec![
                smol_str::SmolStr::new(stringify!($cmd)),
                smol_str::SmolStr::new(format!("touch {}", $out)),
            ];
            __gb.add_rule(kati::rule::Rule {
                target: smol_str::SmolStr::new($out),
                is_double_colon: false,
                prerequisites: __ins,
                order_only: vec![],
                recipe: __recipe,
                is_pattern: false,
                loc: kati::loc::Loc::unknown(),
            });
            __roots.push(smol_str::SmolStr::new($out));
        )*
        __gb.set_default_targets(__roots);
        let graph = __gb.build().unwrap();
        $(
            let $id = graph.lookup($out).unwrap();
        )*
        MockContext { graph, $($id,)* }
    }};
}

// 0) No-op run (no nodes); assert no errors
#[test]
fn test_nothing() {
    let cfg = ExecConfig::default();
    let cx = mock_graph! {};
    let world = MockWorld::new();
    let mut executor = Executor::with_world(&cfg, &cx.graph, &world, &*NOOP_PROGRESS);
    executor.run().unwrap();
}

// 1) Single node: Outdated -> Succeeded; assert exec log and output written
#[test]
fn test_single_node_outdated_succeeded() {
    let cx = mock_graph! {
        a: "out.txt" => A("in.txt");
    };

    let world = MockWorld::new();
    touch_all(&world, &["in.txt"]);

    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);
    assert_eq!(log, vec!["A"]);

    assert!(world.file_exists("out.txt"));
}

// 2) Single node: Outdated -> Failed; assert exec log and output not written
#[test]
fn test_single_node_outdated_failed() {
    let cx = mock_graph! {
        a: "out.txt" => A("in.txt");
    };

    let world = MockWorld::new();
    touch_all(&world, &["in.txt"]);
    set_fail_on(&world, "A");

    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);
    assert_eq!(log, vec!["A"]);

    assert!(!world.file_exists("out.txt"));
}

// 3) Single node: UpToDate on second run (no execution)
#[test]
fn test_single_node_up_to_date() {
    let cx = mock_graph! {
        a: "out.txt" => A("in.txt");
    };

    let world = MockWorld::new();
    touch_all(&world, &["in.txt"]);

    // First run writes the output.
    let _ = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);

    // Second run should be UpToDate and not execute the command.
    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);
    assert!(log.is_empty(), "Expected no execution on UpToDate, got {:?}", log);

    assert!(world.file_exists("out.txt"));
}

// 4) Linear dependency: A -> B success path
#[test]
fn test_linear_dependency_success() {
    let cx = mock_graph! {
        a: "a.out" => A("a.in");
        b, dep(a): "b.out" => B("a.out");
    };

    let world = MockWorld::new();
    touch_all(&world, &["a.in"]);

    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.b]);

    assert_eq!(log.len(), 2);
    assert_order(&log, "A", "B");

    assert!(world.file_exists("b.out"));
}

// 5) Failure propagation: A Failed -> B Skipped (B not executed)
#[test]
fn test_dependency_failure_propagation_skipped() {
    let cx = mock_graph! {
        a: "a.out" => A("a.in");
        b, dep(a): "b.out" => B("a.out");
    };

    let world = MockWorld::new();
    touch_all(&world, &["a.in"]);
    set_fail_on(&world, "A");

    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.b]);
    assert_eq!(log, vec!["A"]);

    assert!(!world.file_exists("a.out"));
    assert!(!world.file_exists("b.out"));
}

// 6) Multiple inputs gate: B executes only after A and C succeed
#[test]
fn test_multi_input_gatekeeping() {
    let cx = mock_graph! {
        a: "a.out" => A("a.in");
        c: "c.out" => C("c.in");
        b, dep(a, c): "b.out" => B("a.out");
    };

    let world = MockWorld::new();
    touch_all(&world, &["a.in", "c.in"]);

    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.b]);
    assert_eq!(log.len(), 2);
    assert_order(&log, "A", "B");

    assert!(world.file_exists("b.out"));
}

// 7) Skipped chain propagation: A Failed -> B Skipped -> C Skipped (B depends on A, C depends on B)
#[test]
fn test_skipped_chain_propagation() {
    let cx = mock_graph! {
        a: "a.out" => A("a.in");
        b, dep(a): "b.out" => B("a.out");
        c, dep(b): "c.out" => C("b.out");
    };

    let world = MockWorld::new();
    touch_all(&world, &["a.in"]);
    set_fail_on(&world, "A");

    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.c]);
    assert_eq!(log, vec!["A"]);

    assert!(!world.file_exists("a.out"));
    assert!(!world.file_exists("b.out"));
    assert!(!world.file_exists("c.out"));
}

// 8) Optional: parallelism=1 with two leaves; sequential execution (no strict order asserted)
#[test]
fn test_parallelism_one_two_leaves() {
    let cx = mock_graph! {
        d: "d.out" => D("d.in");
        e: "e.out" => E("e.in");
    };

    let world = MockWorld::new();
    touch_all(&world, &["d.in", "e.in"]);

    let log = run_graph(&world, &cx.graph, ExecConfig { parallelism: 1 }, [cx.d, cx.e]);
    assert_eq!(log.len(), 2);
    assert_log_include(&log, &["D", "E"]);
}

#[test]
fn test_failure_midway_propagation() {
    let cx = mock_graph! {
        a: "a.out" => A("a.in");
        b, dep(a): "b.out" => B("a.out");
        c, dep(b): "c.out" => C("b.out");
    };

    let world = MockWorld::new();
    touch_all(&world, &["a.in"]);
    set_fail_on(&world, "B");

    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.c]);
    assert_eq!(log, vec!["A", "B"]);
    assert!(world.file_exists("a.out"));
}

#[test]
fn test_up_to_date() {
    let cx = mock_graph! {
        a: "a.out" => A("a.in");
        b, dep(a): "b.out" => B("a.out");
    };

    let world = MockWorld::new();
    touch_all(&world, &["a.in"]);

    // First run writes the outputs.
    let _ = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.b]);

    // Second run should be UpToDate and not execute the command.
    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.b]);
    assert!(log.is_empty(), "Expected no execution on UpToDate, got {:?}", log);

    assert!(world.file_exists("b.out"));
}

#[test]
fn test_two_dependency_failures_skip_consumer() {
    let cx = mock_graph! {
        a: "a.out" => A("a.in");
        b: "b.out" => B("b.in");
        c, dep(a, b): "c.out" => C("a.out");
    };

    let world = MockWorld::new();
    touch_all(&world, &["a.in", "b.in"]);
    set_fail_on_any(&world, &["A", "B"]);

    // Both A and B should have failed, C skipped; no error should be raised.
    let _log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.c]);

    assert!(!world.file_exists("a.out"));
    assert!(!world.file_exists("b.out"));
    assert!(!world.file_exists("c.out"));
}

#[test]
fn test_touch_input_after_first_build_triggers_rebuild() {
    let cx = mock_graph! {
        a: "out.txt" => A("in.txt");
    };

    let world = MockWorld::new();
    touch_all(&world, &["in.txt"]);

    // First run.
    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);
    assert!(world.file_exists("out.txt"));
    assert_eq!(log, vec!["A"]);

    // Touch input after the first build.
    world.touch_file("in.txt");

    // Second run should rebuild, since the input's mtime now exceeds the output's.
    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);
    assert_eq!(log, vec!["A"]);

    assert!(world.file_exists("out.txt"));
}

#[test]
fn test_remove_output_file_after_successful_build() {
    let cx = mock_graph! {
        a: "out.txt" => A("in.txt");
    };

    let world = MockWorld::new();
    touch_all(&world, &["in.txt"]);

    // First run.
    let _ = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);
    assert!(world.file_exists("out.txt"));

    // Simulate removing the output file from the world.
    world.remove_file("out.txt");

    // The command should re-execute to regenerate the missing output.
    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);
    assert_eq!(log, vec!["A"]);

    assert!(world.file_exists("out.txt"));
}

#[test]
fn test_nonexisting_input_file_fails_without_execution() {
    let cx = mock_graph! {
        a: "out.txt" => A("missing.in");
    };

    let world = MockWorld::new();

    let log = run_graph(&world, &cx.graph, ExecConfig::default(), [cx.a]);
    assert!(log.is_empty(), "Expected no execution when input file is missing, got {:?}", log);

    assert!(!world.file_exists("out.txt"));
}
