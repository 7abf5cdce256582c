//! Script generation over whole flows: nesting, removal and determinism.

use proptest::prelude::*;
use trialflow::components::code::{CodeComponent, EACH_FRAME};
use trialflow::{
    BuilderError, Experiment, FlowElement, IndentedWriter, Routine, StairHandler, TrialHandler,
    Value,
};

/// Shape of a generated flow: a routine, or a loop around a sequence.
#[derive(Debug, Clone)]
enum Node {
    Routine,
    Loop(Vec<Node>),
}

fn node_strategy() -> impl Strategy<Value = Node> {
    Just(Node::Routine).prop_recursive(4, 32, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Node::Loop)
    })
}

fn depth(nodes: &[Node]) -> usize {
    nodes
        .iter()
        .map(|n| match n {
            Node::Routine => 0,
            Node::Loop(children) => 1 + depth(children),
        })
        .max()
        .unwrap_or(0)
}

/// Append `nodes` to the end of the flow, wrapping each loop around its children.
fn build(exp: &mut Experiment, nodes: &[Node], counter: &mut usize, loops: &mut usize) {
    for node in nodes {
        *counter += 1;
        match node {
            Node::Routine => {
                let name = format!("r{counter}");
                let mut routine = Routine::new(name.as_str());
                routine.add_component(Box::new(
                    CodeComponent::new(&format!("c{counter}"))
                        .with_times(Value::List(vec![Value::Float(0.0), Value::Float(0.5)])),
                ));
                exp.add_routine(&name, Some(routine));
                let end = exp.flow().len();
                exp.flow_mut().add_routine(&name, end);
            }
            Node::Loop(children) => {
                let name = format!("loop{counter}");
                let start = exp.flow().len();
                build(exp, children, counter, loops);
                let end = exp.flow().len();
                exp.add_loop(TrialHandler::new(&name, "sequential", 2).into(), start, end);
                *loops += 1;
            }
        }
    }
}

proptest! {
    #[test]
    fn well_formed_flows_generate_and_unwind(nodes in prop::collection::vec(node_strategy(), 1..5)) {
        let mut exp = Experiment::new();
        let mut counter = 0;
        let mut loops = 0;
        build(&mut exp, &nodes, &mut counter, &mut loops);

        prop_assert_eq!(exp.flow().validate().unwrap(), depth(&nodes));

        let mut writer = IndentedWriter::new();
        exp.flow().write_code(&mut writer, exp.routines()).unwrap();
        prop_assert_eq!(writer.indent_level(), 0);

        let script = exp.write_script().unwrap();
        let headers = script.lines().filter(|l| l.trim_start().starts_with("for this")).count();
        prop_assert_eq!(headers, loops);
        prop_assert!(script.ends_with("win.close()\ncore.quit()\n"));
    }
}

fn trial_experiment() -> Experiment {
    let mut exp = Experiment::new();
    exp.set_exp_name("flow");
    for (pos, name) in ["intro", "trial", "outro"].iter().enumerate() {
        let mut routine = Routine::new(*name);
        routine.add_component(Box::new(
            CodeComponent::new(&format!("{name}_code")).with_code(EACH_FRAME, "pass"),
        ));
        exp.add_routine(name, Some(routine));
        exp.flow_mut().add_routine(name, pos);
    }
    exp.add_loop(TrialHandler::new("trials", "random", 5).into(), 1, 2);
    exp
}

#[test]
fn test_remove_loop_keeps_other_elements_in_order() {
    let mut exp = trial_experiment();
    exp.add_loop(StairHandler::new("stairs", 20, 0.5).into(), 0, 1);
    assert!(exp
        .flow_mut()
        .remove_component(&FlowElement::LoopInitiator("trials".into())));
    assert_eq!(
        exp.flow().elements(),
        &[
            FlowElement::LoopInitiator("stairs".into()),
            FlowElement::Routine("intro".into()),
            FlowElement::LoopTerminator("stairs".into()),
            FlowElement::Routine("trial".into()),
            FlowElement::Routine("outro".into()),
        ]
    );
    assert!(exp.flow().get_loop("trials").is_none());
    assert!(exp.write_script().is_ok());
}

#[test]
fn test_remove_routine_element() {
    let mut exp = trial_experiment();
    assert!(exp
        .flow_mut()
        .remove_component(&FlowElement::Routine("outro".into())));
    assert!(!exp
        .flow_mut()
        .remove_component(&FlowElement::Routine("outro".into())));
    assert_eq!(exp.flow().len(), 4);
}

#[test]
fn test_write_script_is_idempotent() {
    let exp = trial_experiment();
    let first = exp.write_script().unwrap();
    let second = exp.write_script().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_script_shape() {
    let script = trial_experiment().write_script().unwrap();
    let imports = script.find("from psychopy import").unwrap();
    let window = script.find("win=visual.Window(").unwrap();
    let handler = script.find("trials=data.TrialHandler(").unwrap();
    let body = script.find("#Start of the experiment").unwrap();
    let teardown = script.find("win.close()").unwrap();
    assert!(imports < window && window < handler && handler < body && body < teardown);
    assert!(script.contains("\nfor thisTrial in trials:\n"));
    assert!(script.contains("\n    while continueTrial and (t<1.0000):\n"));
    assert!(script.contains("\n        pass\n"));
}

#[test]
fn test_routine_main_code_restores_indent() {
    let exp = trial_experiment();
    let routine = exp.routine("trial").unwrap();
    for start in [0, 1, 3] {
        let mut writer = IndentedWriter::new();
        writer.set_indent_level(start, false);
        routine.write_main_code(&mut writer).unwrap();
        assert_eq!(writer.indent_level(), start);
    }
}

#[test]
fn test_terminator_before_initiator_names_the_loop() {
    let mut exp = trial_experiment();
    exp.flow_mut()
        .remove_component(&FlowElement::Routine("outro".into()));
    // terminator before its initiator
    exp.add_loop(TrialHandler::new("late", "random", 1).into(), 3, 0);
    match exp.write_script() {
        Err(BuilderError::MalformedFlowStructure { loop_name, .. }) => {
            assert_eq!(loop_name, "late")
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_bad_times_abort_generation() {
    let mut exp = trial_experiment();
    let routine = exp.routine_mut("trial").unwrap();
    routine.add_component(Box::new(CodeComponent::new("broken").with_times("[0, soon]")));
    match exp.write_script() {
        Err(BuilderError::CodeEvaluation {
            routine, component, ..
        }) => {
            assert_eq!(routine, "trial");
            assert_eq!(component, "broken");
        }
        other => panic!("unexpected: {:?}", other),
    }
}
