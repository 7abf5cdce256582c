//! Saving and loading experiment documents.

use indexmap::IndexMap;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};
use trialflow::components::code::{CodeComponent, BEGIN_ROUTINE};
use trialflow::document::{FORMAT_VERSION, ROOT_TAG};
use trialflow::{
    BuilderError, Experiment, FlowElement, Routine, StairHandler, TrialHandler, UpdatePolicy,
    Value, ValueKind,
};

fn conditions() -> Vec<IndexMap<String, Value>> {
    [("congruent", "red", 1), ("incongruent", "green", 0)]
        .into_iter()
        .map(|(kind, colour, correct)| {
            let mut c = IndexMap::new();
            c.insert("kind".to_string(), Value::from(kind));
            c.insert("colour".to_string(), Value::from(colour));
            c.insert("corrAns".to_string(), Value::Int(correct));
            c
        })
        .collect()
}

fn trials_experiment() -> Experiment {
    let mut exp = Experiment::new();
    exp.set_exp_name("stroop");
    let mut routine = Routine::new("trial");
    routine.add_component(Box::new(
        CodeComponent::new("setup")
            .with_times("[0, 2.5]")
            .with_code(BEGIN_ROUTINE, "msg = \"it's a \\\"test\\\"\"\nrt = None"),
    ));
    exp.add_routine("trial", Some(routine));
    exp.flow_mut().add_routine("trial", 0);
    exp.add_loop(
        TrialHandler::new("trials", "random", 5)
            .with_trial_list(conditions())
            .into(),
        0,
        1,
    );
    exp
}

fn write_temp(contents: &str) -> NamedTempFile {
    let mut temp = NamedTempFile::new().unwrap();
    write!(temp, "{contents}").unwrap();
    temp
}

#[test]
fn test_round_trip_reproduces_flow_routines_and_params() {
    let exp = trials_experiment();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stroop.tfexp");
    exp.save_to_xml(&path).unwrap();

    let loaded = Experiment::load_from_xml(&path).unwrap();
    assert_eq!(
        loaded.flow().elements(),
        &[
            FlowElement::LoopInitiator("trials".into()),
            FlowElement::Routine("trial".into()),
            FlowElement::LoopTerminator("trials".into()),
        ]
    );

    let trials = loaded.flow().get_loop("trials").unwrap();
    let n_reps = trials.params().get("nReps").unwrap();
    assert_eq!(n_reps.value.as_f64(), Some(5.0));
    assert_eq!(n_reps.kind, ValueKind::Numeric);
    assert_eq!(
        trials.params().get("trialList").unwrap().value,
        Value::List(conditions().into_iter().map(Value::Dict).collect())
    );

    let routine = loaded.routine("trial").unwrap();
    assert_eq!(routine.len(), 1);
    let setup = routine.get_component_from_name("setup").unwrap();
    assert_eq!(setup.component_type(), "CodeComponent");
    for (name, param) in exp.routine("trial").unwrap().components()[0].params().iter() {
        assert_eq!(setup.params().get(name), Some(param), "param {name}");
    }
    assert_eq!(routine.max_time().unwrap(), 2.5);

    assert_eq!(loaded.name(), Some("stroop"));
    assert_eq!(loaded.required_libs(), exp.required_libs());
    assert_eq!(loaded.write_script().unwrap(), exp.write_script().unwrap());
}

#[test]
fn test_round_trip_keeps_update_policy_and_staircase() {
    let mut exp = trials_experiment();
    exp.routine_mut("trial")
        .unwrap()
        .get_component_mut("setup")
        .unwrap()
        .params_mut()
        .get_mut("times")
        .unwrap()
        .updates = UpdatePolicy::EveryRepeat;
    exp.add_loop(StairHandler::new("stairs", 40, 0.25).into(), 0, 3);

    let loaded = Experiment::from_xml_str(&exp.to_xml_string().unwrap()).unwrap();
    let setup = loaded
        .routine("trial")
        .unwrap()
        .get_component_from_name("setup")
        .unwrap();
    assert_eq!(
        setup.params().get("times").unwrap().updates,
        UpdatePolicy::EveryRepeat
    );
    assert_eq!(loaded.flow().get_loop("stairs"), exp.flow().get_loop("stairs"));
    assert_eq!(loaded.flow().validate().unwrap(), 2);
}

#[test]
fn test_renamed_loop_survives_save_and_load() {
    let mut exp = trials_experiment();
    exp.rename_loop("trials", "blocks").unwrap();
    exp.flow_mut()
        .get_loop_mut("blocks")
        .unwrap()
        .param_mut("nReps")
        .unwrap()
        .value = Value::Int(8);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("renamed.tfexp");
    exp.save_to_xml(&path).unwrap();
    let loaded = Experiment::load_from_xml(&path).unwrap();

    assert_eq!(
        loaded.flow().elements(),
        &[
            FlowElement::LoopInitiator("blocks".into()),
            FlowElement::Routine("trial".into()),
            FlowElement::LoopTerminator("blocks".into()),
        ]
    );
    assert_eq!(loaded.get_used_name("blocks").as_deref(), Some("TrialHandler"));
    assert_eq!(loaded.get_used_name("trials"), None);
    let script = loaded.write_script().unwrap();
    assert!(script.contains("blocks=data.TrialHandler(nReps=8.0,"));
    assert!(script.contains("\nfor thisBlock in blocks:\n"));
}

#[test]
fn test_loop_name_attribute_wins_over_name_param() {
    let xml = format!(
        r#"<{ROOT_TAG} version="0.1.0"><Settings/><Routines/><Flow>
             <TrialHandler name="blocks"><Param name="name" val="'trials'" valType="code"/></TrialHandler>
             <LoopTerminator name="blocks"/>
           </Flow></{ROOT_TAG}>"#
    );
    let exp = Experiment::from_xml_str(&xml).unwrap();
    assert_eq!(exp.flow().get_loop("blocks").unwrap().name(), "blocks");
}

#[test]
fn test_truncated_condition_list_fails_generation() {
    let xml = format!(
        r#"<{ROOT_TAG} version="0.1.0"><Settings/><Routines><Routine name="trial"/></Routines><Flow>
             <TrialHandler name="trials">
               <Param name="trialList" val="[{{'ori': 0}}, {{'ori': 90" valType="str"/>
             </TrialHandler>
             <Routine name="trial"/>
             <LoopTerminator name="trials"/>
           </Flow></{ROOT_TAG}>"#
    );
    let exp = Experiment::from_xml_str(&xml).unwrap();
    match exp.write_script() {
        Err(BuilderError::InvalidParam { owner, param, .. }) => {
            assert_eq!(owner, "trials");
            assert_eq!(param, "trialList");
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_disallowed_kind_or_update_policy_is_rejected() {
    let component = |param: &str| {
        format!(
            r#"<{ROOT_TAG} version="0.1.0"><Settings/><Routines><Routine name="trial">
                 <CodeComponent name="setup">{param}</CodeComponent>
               </Routine></Routines><Flow/></{ROOT_TAG}>"#
        )
    };

    let wrong_kind = component(r#"<Param name="Each Frame" val="1" valType="num"/>"#);
    match Experiment::from_xml_str(&wrong_kind) {
        Err(BuilderError::InvalidParam { owner, param, .. }) => {
            assert_eq!(owner, "setup");
            assert_eq!(param, "Each Frame");
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }

    let wrong_updates = component(
        r#"<Param name="Each Frame" val="'x=1'" valType="code" updates="set every frame"/>"#,
    );
    assert!(matches!(
        Experiment::from_xml_str(&wrong_updates),
        Err(BuilderError::InvalidParam { .. })
    ));

    let numeric_times = component(r#"<Param name="times" val="[0, 3]" valType="num"/>"#);
    let exp = Experiment::from_xml_str(&numeric_times).unwrap();
    assert_eq!(exp.routine("trial").unwrap().max_time().unwrap(), 3.0);
}

#[test]
fn test_missing_settings_is_malformed() {
    let temp = write_temp(&format!(
        r#"<{ROOT_TAG} version="0.1.0"><Routines/><Flow/></{ROOT_TAG}>"#
    ));
    match Experiment::load_from_xml(temp.path()) {
        Err(BuilderError::MalformedDocument(what)) => assert!(what.contains("Settings")),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_param_value_is_malformed() {
    let xml = format!(
        r#"<{ROOT_TAG} version="0.1.0"><Settings><Param name="Units"/></Settings><Routines/><Flow/></{ROOT_TAG}>"#
    );
    match Experiment::from_xml_str(&xml) {
        Err(BuilderError::MalformedDocument(what)) => assert!(what.contains("'val'")),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_unknown_component_type() {
    let xml = format!(
        r#"<{ROOT_TAG} version="0.1.0"><Settings/><Routines><Routine name="trial"><Grating name="g"/></Routine></Routines><Flow/></{ROOT_TAG}>"#
    );
    match Experiment::from_xml_str(&xml) {
        Err(BuilderError::UnknownComponentType(kind)) => assert_eq!(kind, "Grating"),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_flow_reference_to_missing_routine() {
    let xml = format!(
        r#"<{ROOT_TAG} version="0.1.0"><Settings/><Routines/><Flow><Routine name="ghost"/></Flow></{ROOT_TAG}>"#
    );
    assert!(matches!(
        Experiment::from_xml_str(&xml),
        Err(BuilderError::MalformedDocument(_))
    ));
}

#[test]
fn test_unterminated_loop_in_document() {
    let xml = format!(
        r#"<{ROOT_TAG} version="0.1.0"><Settings/><Routines/><Flow><TrialHandler name="trials"/></Flow></{ROOT_TAG}>"#
    );
    match Experiment::from_xml_str(&xml) {
        Err(BuilderError::MalformedFlowStructure { loop_name, .. }) => {
            assert_eq!(loop_name, "trials")
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_newer_format_and_hand_edited_values_load() {
    let xml = format!(
        r#"<{ROOT_TAG} version="9.0.0" formatVersion="{}">
             <Settings>
               <Param name="expName" val="handmade" valType="str"/>
               <Param name="Window size (pixels)" val="[800, 600]" valType="code" updates="None"/>
             </Settings>
             <Routines/>
             <Flow/>
           </{ROOT_TAG}>"#,
        FORMAT_VERSION + 1
    );
    let exp = Experiment::from_xml_str(&xml).unwrap();
    assert_eq!(exp.version(), "9.0.0");
    assert_eq!(exp.name(), Some("handmade"));
    let script = exp.write_script().unwrap();
    assert!(script.contains("win=visual.Window(size=[800, 600],"));
}

#[test]
fn test_not_xml() {
    let temp = write_temp("this is not xml");
    assert!(matches!(
        Experiment::load_from_xml(temp.path()),
        Err(BuilderError::XmlParse(_))
    ));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Experiment::load_from_xml(&dir.path().join("absent.tfexp")),
        Err(BuilderError::Io(_))
    ));
}
