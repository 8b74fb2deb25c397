use common::Shared;

use crate::call_graph::CallGraph;
use crate::dependency_graph::DependencyGraph;
use crate::error::Result;
use crate::node::{node_ref, Declaration, Node, NodeId};

// Nodes read each other's values through shared handles; the graph only
// orders the calls.

struct Joint {
    id: NodeId,
    target: f64,
    position: f64,
}

impl Node for Joint {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        "joint"
    }

    fn declare(&self, decl: &mut Declaration<'_>) -> Result<()> {
        decl.output("Position")?;
        decl.update("read", &["Position"])
    }

    fn update(&mut self, update: &str) -> anyhow::Result<()> {
        match update {
            "read" => {
                // first order lag towards the commanded target
                self.position += 0.5 * (self.target - self.position);
                Ok(())
            }
            _ => anyhow::bail!("unknown update {}", update),
        }
    }
}

struct Reference {
    id: NodeId,
    setpoint: f64,
    value: f64,
}

impl Node for Reference {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        "reference"
    }

    fn declare(&self, decl: &mut Declaration<'_>) -> Result<()> {
        decl.output("Value")?;
        decl.update("sample", &["Value"])
    }

    fn update(&mut self, _update: &str) -> anyhow::Result<()> {
        self.value = self.setpoint;
        Ok(())
    }
}

struct Controller {
    id: NodeId,
    gain: f64,
    joint: Shared<Joint>,
    reference: Shared<Reference>,
    command: f64,
}

impl Node for Controller {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        "controller"
    }

    fn declare(&self, decl: &mut Declaration<'_>) -> Result<()> {
        let joint = self.joint.lock().id;
        let reference = self.reference.lock().id;

        decl.output("Command")?;
        decl.dynamic_output("Error", false)?;
        decl.update("compute_error", &["Error"])?;
        decl.update("compute_command", &["Command"])?;
        decl.internal_dependency("compute_command", "compute_error")?;
        decl.input_dependency("compute_error", joint, "Position")?;
        decl.input_dependency("compute_error", reference, "Value")
    }

    fn update(&mut self, update: &str) -> anyhow::Result<()> {
        match update {
            "compute_error" => Ok(()),
            "compute_command" => {
                let error = self.reference.lock().value - self.joint.lock().position;
                self.command = self.gain * error;
                Ok(())
            }
            _ => anyhow::bail!("unknown update {}", update),
        }
    }
}

#[test]
fn controller_tracks_reference() -> anyhow::Result<()> {
    let mut graph = DependencyGraph::new();

    let joint = Shared::new(Joint {
        id: NodeId::unique(),
        target: 1.0,
        position: 0.0,
    });
    let reference = Shared::new(Reference {
        id: NodeId::unique(),
        setpoint: 1.0,
        value: 0.0,
    });
    let controller = Shared::new(Controller {
        id: NodeId::unique(),
        gain: 2.0,
        joint: joint.clone(),
        reference: reference.clone(),
        command: 0.0,
    });

    // sources must be registered before the nodes reading them
    graph.add_node(node_ref(&reference))?;
    let joint_id = graph.add_node(node_ref(&joint))?;
    let controller_id = graph.add_node(node_ref(&controller))?;

    let mut call_graph = CallGraph::default();
    call_graph.add_output(&graph, controller_id, "Command")?;
    assert_eq!(
        call_graph.build(&graph)?.call_names(),
        [
            "reference.sample",
            "joint.read",
            "controller.compute_error",
            "controller.compute_command"
        ]
    );

    call_graph.run(&graph)?;
    assert!((controller.lock().command - 1.0).abs() < 1e-9);

    call_graph.run(&graph)?;
    assert!((controller.lock().command - 0.5).abs() < 1e-9);

    // requesting the disabled error output fails the build until it is enabled
    call_graph.add_output(&graph, controller_id, "Error")?;
    assert!(call_graph.build(&graph).is_err());
    graph.set_output_enabled(controller_id, "Error", true)?;
    assert_eq!(call_graph.build(&graph)?.len(), 4);

    assert!(graph.contains(joint_id));

    Ok(())
}
