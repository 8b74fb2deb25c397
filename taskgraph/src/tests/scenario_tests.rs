use common::log_setup::setup_test_logging;
use hashbrown::HashMap;

use crate::call_graph::{CallGraph, PlanState};
use crate::dependency_graph::{DependencyGraph, Edge};
use crate::error::Error;
use crate::inputs::OutputRef;
use crate::logger::{DotOptions, Logger};
use crate::options::{CallGraphOptions, DisabledOutputPolicy};
use crate::tests::fixtures::{chain, diamond, take_trace, TestNode, Trace};

#[test]
fn scenario_a_requests_only_what_is_needed() -> anyhow::Result<()> {
    setup_test_logging();

    let chain = chain()?;
    let graph = &chain.graph;

    let mut call_graph = CallGraph::default();
    call_graph.add_output(graph, chain.q, "Result")?;
    call_graph.run(graph)?;
    assert_eq!(
        take_trace(&chain.trace),
        ["p.compute_value", "q.compute_result"]
    );

    let mut call_graph = CallGraph::default();
    call_graph.add_output(graph, chain.p, "Value")?;
    let stats = call_graph.run(graph)?;
    assert_eq!(stats.executed_calls, 1);
    assert_eq!(take_trace(&chain.trace), ["p.compute_value"]);

    Ok(())
}

#[test]
fn scenario_b_runs_shared_dependency_once() -> anyhow::Result<()> {
    setup_test_logging();

    let diamond = diamond(DependencyGraph::new())?;
    let graph = &diamond.graph;

    let mut call_graph = CallGraph::default();
    call_graph.add_output(graph, diamond.d, "Value")?;
    call_graph.run(graph)?;

    assert_eq!(
        take_trace(&diamond.trace),
        ["a.Update", "b.Update", "c.Update", "d.Update"]
    );

    // running again repeats the same calls
    call_graph.run(graph)?;
    assert_eq!(take_trace(&diamond.trace).len(), 4);

    Ok(())
}

struct Sensor {
    graph: DependencyGraph,
    trace: Trace,
    sensor: crate::node::NodeId,
    consumer: crate::node::NodeId,
}

// `sensor.Rate` can be switched off; `consumer` only reads `sensor.Value`
fn sensor() -> anyhow::Result<Sensor> {
    let trace = Trace::default();
    let mut graph = DependencyGraph::new();

    let (sensor, _) = TestNode::new("sensor", &trace)
        .output("Value")
        .dynamic_output("Rate", true)
        .update("read", &["Value"])
        .update("estimate_rate", &["Rate"])
        .internal("estimate_rate", "read")
        .register(&mut graph)?;
    let (consumer, _) = TestNode::new("consumer", &trace)
        .output("Command")
        .update("compute_command", &["Command"])
        .input("compute_command", sensor, "Value")
        .register(&mut graph)?;

    Ok(Sensor {
        graph,
        trace,
        sensor,
        consumer,
    })
}

#[test]
fn scenario_c_disabled_output_raises_by_default() -> anyhow::Result<()> {
    setup_test_logging();

    let Sensor {
        mut graph,
        trace,
        sensor,
        consumer,
    } = sensor()?;

    let mut call_graph = CallGraph::default();
    call_graph.add_output(&graph, sensor, "Rate")?;
    call_graph.add_output(&graph, consumer, "Command")?;
    call_graph.run(&graph)?;
    assert_eq!(
        take_trace(&trace),
        ["sensor.read", "sensor.estimate_rate", "consumer.compute_command"]
    );

    graph.set_output_enabled(sensor, "Rate", false)?;
    assert_eq!(call_graph.state(&graph), PlanState::Dirty);

    let err = call_graph.run(&graph).err();
    assert!(matches!(err, Some(Error::OutputDisabled { ref output, .. }) if output == "Rate"));
    assert!(take_trace(&trace).is_empty());

    // enabling it again restores the previous plan
    graph.set_output_enabled(sensor, "Rate", true)?;
    call_graph.run(&graph)?;
    assert_eq!(take_trace(&trace).len(), 3);

    Ok(())
}

#[test]
fn scenario_c_disabled_output_can_be_dropped() -> anyhow::Result<()> {
    setup_test_logging();

    let Sensor {
        mut graph,
        trace,
        sensor,
        consumer,
    } = sensor()?;

    let mut call_graph = CallGraph::new(CallGraphOptions {
        disabled_outputs: DisabledOutputPolicy::Drop,
        ..Default::default()
    });
    call_graph.add_output(&graph, sensor, "Rate")?;
    call_graph.add_output(&graph, consumer, "Command")?;

    graph.set_output_enabled(sensor, "Rate", false)?;
    call_graph.run(&graph)?;
    assert_eq!(
        take_trace(&trace),
        ["sensor.read", "consumer.compute_command"]
    );
    let plan = call_graph.build(&graph)?;
    assert_eq!(plan.targets(), [OutputRef::new(consumer, "Command")]);

    // still wanted, so it comes back once enabled
    graph.set_output_enabled(sensor, "Rate", true)?;
    call_graph.run(&graph)?;
    assert_eq!(
        take_trace(&trace),
        ["sensor.read", "sensor.estimate_rate", "consumer.compute_command"]
    );

    Ok(())
}

#[test]
fn dependency_on_disabled_output_always_fails() -> anyhow::Result<()> {
    setup_test_logging();

    let Sensor {
        mut graph,
        trace,
        sensor,
        ..
    } = sensor()?;

    let (filter, _) = TestNode::new("filter", &trace)
        .output("Rate")
        .update("smooth", &["Rate"])
        .input("smooth", sensor, "Rate")
        .register(&mut graph)?;

    let mut call_graph = CallGraph::new(CallGraphOptions {
        disabled_outputs: DisabledOutputPolicy::Drop,
        ..Default::default()
    });
    call_graph.add_output(&graph, filter, "Rate")?;
    graph.set_output_enabled(sensor, "Rate", false)?;

    let err = call_graph.run(&graph).err();
    assert!(matches!(err, Some(Error::OutputDisabled { ref node, .. }) if node == "sensor"));
    assert!(take_trace(&trace).is_empty());

    Ok(())
}

#[test]
fn every_call_runs_after_its_dependencies() -> anyhow::Result<()> {
    setup_test_logging();

    let trace = Trace::default();
    let mut graph = DependencyGraph::new();

    // solver reads mirror through an edge added after registration
    let (base, _) = TestNode::new("base", &trace)
        .output("Pose")
        .output("Jacobian")
        .update("compute_pose", &["Pose"])
        .update("compute_jacobian", &["Jacobian"])
        .internal("compute_jacobian", "compute_pose")
        .register(&mut graph)?;
    let (task, _) = TestNode::new("task", &trace)
        .output("Error")
        .output("Jacobian")
        .update("compute_error", &["Error"])
        .update("compute_jacobian", &["Jacobian"])
        .input("compute_error", base, "Pose")
        .input("compute_jacobian", base, "Jacobian")
        .register(&mut graph)?;
    let (mirror, _) = TestNode::new("mirror", &trace)
        .output("Jacobian")
        .direct("Jacobian", task, "Jacobian")
        .register(&mut graph)?;
    let (solver, _) = TestNode::new("solver", &trace)
        .output("Velocity")
        .update("prepare", &[])
        .update("solve", &["Velocity"])
        .internal("solve", "prepare")
        .input("solve", task, "Error")
        .register(&mut graph)?;
    graph.add_edge(Edge::input(solver, "solve", mirror, "Jacobian"))?;
    let (idle, _) = TestNode::new("idle", &trace)
        .output("Value")
        .update("compute_value", &["Value"])
        .register(&mut graph)?;

    let mut call_graph = CallGraph::default();
    call_graph.add_output(&graph, solver, "Velocity")?;
    let plan = call_graph.build(&graph)?;

    let position: HashMap<String, usize> = plan
        .call_names()
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name, idx))
        .collect();
    assert_eq!(position.len(), plan.len());
    assert_eq!(plan.len(), 6);

    let before = [
        ("base.compute_pose", "base.compute_jacobian"),
        ("base.compute_pose", "task.compute_error"),
        ("base.compute_jacobian", "task.compute_jacobian"),
        ("task.compute_jacobian", "solver.solve"),
        ("task.compute_error", "solver.solve"),
        ("solver.prepare", "solver.solve"),
    ];
    for (first, second) in before {
        assert!(
            position[first] < position[second],
            "{} should run before {}",
            first,
            second
        );
    }
    assert!(!position.contains_key("idle.compute_value"));

    // depth never decreases along the plan
    assert!(plan
        .calls()
        .windows(2)
        .all(|pair| pair[0].depth <= pair[1].depth));

    assert!(graph.contains(idle));

    Ok(())
}

#[test]
fn dot_export_shows_graph_and_calls() -> anyhow::Result<()> {
    setup_test_logging();

    let logger = Logger::new();
    let diamond = diamond(DependencyGraph::with_logger(logger.clone()))?;
    let graph = &diamond.graph;

    let mut call_graph = CallGraph::new(CallGraphOptions {
        record_calls: true,
        ..Default::default()
    });
    call_graph.add_output(graph, diamond.b, "Value")?;
    call_graph.run(graph)?;

    let dot = logger.to_dot(&DotOptions::default());
    assert!(dot.starts_with("digraph taskgraph {"));
    assert_eq!(dot.matches("subgraph cluster_").count(), 4);
    assert!(dot.contains("label=\"Update()\""));
    assert!(!dot.contains("fillcolor"));

    let dot = logger.to_dot(&DotOptions {
        highlight_output: Some(OutputRef::new(diamond.b, "Value")),
        highlight_calls: true,
        show_calls: true,
    });
    assert_eq!(dot.matches("fillcolor").count(), 2);
    assert!(dot.contains("label=\"Update() #0\""));
    assert!(dot.contains("label=\"Update() #1\""));
    assert!(dot.contains("constraint=false"));
    // a.Value, a.Update, b.Update, b.Value and the three edges between them
    assert_eq!(dot.matches("color=red").count(), 7);

    Ok(())
}
