//! Loop handlers placed in the flow between an initiator and a terminator.
//!
//! Both handlers write three fragments:
//!
//! - init code, emitted once before the flow runs (handler construction),
//! - loop start code, the `for` header, which raises the indent level,
//! - loop end code, which lowers it again and saves the collected data.
//!
//! The start and end fragments are written by different flow elements, so the
//! indent change cannot be scoped; [`crate::flow::Flow::write_code`] pairs them.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{BuilderError, BuilderResult};
use crate::param::{Param, ParamSet, ValueKind};
use crate::routine::capitalize;
use crate::value::Value;
use crate::writer::IndentedWriter;

/// Order in which a [`TrialHandler`] presents its conditions.
pub const LOOP_TYPES: [&str; 3] = ["random", "sequential", "staircase"];

/// Name of the per-iteration variable, e.g. `trials` -> `thisTrial`.
pub fn iteration_alias(loop_name: &str) -> String {
    let mut alias = capitalize(loop_name);
    alias.pop();
    format!("this{alias}")
}

fn loop_name_param(name: &str) -> Param {
    Param::new(name, ValueKind::Code).with_hint("Name of this loop")
}

fn end_points_param() -> Param {
    Param::new(
        Value::List(vec![Value::Int(0), Value::Int(1)]),
        ValueKind::Numeric,
    )
    .with_hint("Where to loop from and to (see values currently shown in the flow view)")
}

fn loop_type_param(loop_type: &str) -> Param {
    Param::new(loop_type, ValueKind::Str)
        .with_allowed_values(LOOP_TYPES)
        .with_hint("How should the next trial value(s) be chosen?")
}

/// Repeats its body over a list of trial conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialHandler {
    params: ParamSet,
}

impl TrialHandler {
    /// Element tag in experiment documents.
    pub const TYPE: &'static str = "TrialHandler";

    /// Handler with no conditions.
    pub fn new(name: &str, loop_type: &str, n_reps: impl Into<Value>) -> Self {
        let mut params = ParamSet::new();
        params.insert("name", loop_name_param(name));
        params.insert(
            "nReps",
            Param::new(n_reps, ValueKind::Numeric)
                .with_allowed_kinds(&[ValueKind::Numeric, ValueKind::Code])
                .with_hint("Number of repeats (for each type of trial)"),
        );
        params.insert(
            "trialList",
            Param::new(Value::List(Vec::new()), ValueKind::Str).with_hint(
                "A list of dictionaries describing the differences between each trial type",
            ),
        );
        params.insert(
            "trialListFile",
            Param::new("", ValueKind::Str).with_hint(
                "A comma-separated-value (.csv) file specifying the parameters for each trial",
            ),
        );
        params.insert("loopType", loop_type_param(loop_type));
        params.insert("endPoints", end_points_param());
        Self { params }
    }

    /// Set the trial conditions, one dictionary per trial type.
    pub fn with_trial_list(mut self, conditions: Vec<IndexMap<String, Value>>) -> Self {
        if let Some(param) = self.params.get_mut("trialList") {
            param.value = Value::List(conditions.into_iter().map(Value::Dict).collect());
        }
        self
    }

    /// Read the conditions from a file at run time instead.
    pub fn with_trial_list_file(mut self, file: &str) -> Self {
        if let Some(param) = self.params.get_mut("trialListFile") {
            param.value = Value::from(file);
        }
        self
    }

    /// Conditions as stored, each a literal value (normally a dict).
    ///
    /// A condition list kept as text (hand-edited documents) must parse as a
    /// list literal, otherwise this is `InvalidParam` naming the loop.
    pub fn conditions(&self) -> BuilderResult<Vec<Value>> {
        let invalid = |reason: String| BuilderError::InvalidParam {
            owner: self.params.text("name"),
            param: "trialList".to_string(),
            reason,
        };
        match self.params.get("trialList").map(|p| &p.value) {
            Some(Value::List(items)) => Ok(items.clone()),
            Some(Value::Str(text)) if text.trim().is_empty() => Ok(Vec::new()),
            Some(Value::Str(text)) => match Value::parse_literal(text) {
                Ok(Value::List(items)) => Ok(items),
                Ok(other) => Err(invalid(format!("expected a list, found {}", other.to_literal()))),
                Err(e) => Err(invalid(e.to_string())),
            },
            Some(Value::None) | None => Ok(Vec::new()),
            Some(other) => Err(invalid(format!("expected a list, found {}", other.to_literal()))),
        }
    }

    fn write_init_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        let name = self.params.render("name")?;
        let file = self.params.text("trialListFile");
        let trial_list = if file.trim().is_empty() {
            let conditions = self.conditions()?;
            if conditions.is_empty() {
                "[]".to_string()
            } else {
                let mut text = String::from("[ \\\n");
                for condition in &conditions {
                    text.push_str(&format!("        {},\n", condition.to_literal()));
                }
                text.push_str("        ]");
                text
            }
        } else {
            format!("data.importTrialList({})", self.params.render("trialListFile")?)
        };

        writer.blank_line();
        writer.write_indented("#set up handler to look after randomisation of trials etc\n");
        writer.write_indented(&format!(
            "{name}=data.TrialHandler(nReps={}, method={}, extraInfo=expInfo, trialList={trial_list})\n",
            self.params.render("nReps")?,
            self.params.render("loopType")?,
        ));
        writer.write_indented(&format!(
            "{}={name}.trialList[0]#so we can initialise stimuli with first trial values\n",
            iteration_alias(&name),
        ));
        Ok(())
    }

    fn write_loop_end_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        let name = self.params.render("name")?;
        writer.blank_line();
        writer.write_indented(&format!(
            "#completed {} repeats of '{name}'\n",
            self.params.text("nReps")
        ));
        writer.blank_line();

        let stim_out = match self.conditions()?.first() {
            Some(Value::Dict(first)) => {
                Value::List(first.keys().map(|k| Value::from(k.as_str())).collect())
            }
            _ => Value::List(Vec::new()),
        };
        writer.write_indented(&format!("{name}.saveAsPickle(filename+'.psydat')\n"));
        writer.write_indented(&format!("{name}.saveAsText(filename+'.dlm',\n"));
        writer.write_indented(&format!("    stimOut={},\n", stim_out.to_literal()));
        writer.write_indented("    dataOut=['n','all_mean','all_std', 'all_raw'])\n");
        writer.write_indented("psychopy.log.info('saved data to '+filename+'.dlm')\n");
        Ok(())
    }
}

/// Adaptive staircase: the level of each trial depends on earlier responses.
#[derive(Debug, Clone, PartialEq)]
pub struct StairHandler {
    params: ParamSet,
}

impl StairHandler {
    /// Element tag in experiment documents.
    pub const TYPE: &'static str = "StairHandler";

    /// Staircase starting at `start_value` with the usual 1-up/3-down rule.
    pub fn new(name: &str, n_reps: impl Into<Value>, start_value: impl Into<Value>) -> Self {
        let mut params = ParamSet::new();
        params.insert("name", loop_name_param(name));
        params.insert(
            "nReps",
            Param::new(n_reps, ValueKind::Numeric)
                .with_allowed_kinds(&[ValueKind::Numeric, ValueKind::Code])
                .with_hint("(Minimum) number of trials in the staircase"),
        );
        params.insert(
            "start value",
            Param::new(start_value, ValueKind::Numeric)
                .with_hint("The initial value of the parameter"),
        );
        params.insert(
            "max value",
            Param::new(1, ValueKind::Numeric).with_hint("The maximum value the parameter can take"),
        );
        params.insert(
            "min value",
            Param::new(0, ValueKind::Numeric).with_hint("The minimum value the parameter can take"),
        );
        params.insert(
            "step sizes",
            Param::new(
                Value::List([4, 4, 2, 2, 1].into_iter().map(Value::Int).collect()),
                ValueKind::Numeric,
            )
            .with_hint("The size of the jump at each step (can change on each 'reversal')"),
        );
        params.insert(
            "step type",
            Param::new("db", ValueKind::Str)
                .with_allowed_values(["lin", "log", "db"])
                .with_hint("The units of the step size"),
        );
        params.insert(
            "N up",
            Param::new(1, ValueKind::Code)
                .with_hint("The number of 'incorrect' answers before the value goes up"),
        );
        params.insert(
            "N down",
            Param::new(3, ValueKind::Code)
                .with_hint("The number of 'correct' answers before the value goes down"),
        );
        params.insert(
            "N reversals",
            Param::new(Value::None, ValueKind::Code).with_hint(
                "Minimum number of times the staircase must change direction before ending",
            ),
        );
        params.insert("loopType", loop_type_param("staircase"));
        params.insert("endPoints", end_points_param());
        Self { params }
    }

    fn write_init_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        let p = &self.params;
        let name = p.render("name")?;
        writer.blank_line();
        writer.write_indented("#set up handler to look after next chosen value etc\n");
        writer.write_indented(&format!(
            "{name}=data.StairHandler(startVal={}, extraInfo=expInfo,\n",
            p.render("start value")?
        ));
        writer.write_indented(&format!(
            "    stepSizes={}, stepType={},\n",
            p.render("step sizes")?,
            p.render("step type")?
        ));
        writer.write_indented(&format!(
            "    nReversals={}, nTrials={},\n",
            p.render("N reversals")?,
            p.render("nReps")?
        ));
        writer.write_indented(&format!(
            "    nUp={}, nDown={},\n",
            p.render("N up")?,
            p.render("N down")?
        ));
        writer.write_indented(&format!(
            "    minVal={}, maxVal={})\n",
            p.render("min value")?,
            p.render("max value")?
        ));
        writer.write_indented(&format!(
            "{}={}#so we can initialise stimuli with the first level\n",
            iteration_alias(&name),
            p.render("start value")?
        ));
        Ok(())
    }

    fn write_loop_end_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        let name = self.params.render("name")?;
        writer.blank_line();
        writer.write_indented("#staircase completed\n");
        writer.blank_line();
        writer.write_indented(&format!("{name}.saveAsText(filename+'.dlm')\n"));
        writer.write_indented(&format!("{name}.saveAsPickle(filename+'.psydat')\n"));
        writer.write_indented("psychopy.log.info('saved data to '+filename+'.dlm')\n");
        Ok(())
    }
}

/// A loop registered in the flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Loop {
    /// Fixed list of conditions
    Trials(TrialHandler),
    /// Adaptive staircase
    Staircase(StairHandler),
}

impl From<TrialHandler> for Loop {
    fn from(handler: TrialHandler) -> Self {
        Loop::Trials(handler)
    }
}

impl From<StairHandler> for Loop {
    fn from(handler: StairHandler) -> Self {
        Loop::Staircase(handler)
    }
}

impl Loop {
    /// Default-configured loop for a document tag.
    pub fn from_type_tag(tag: &str, name: &str) -> BuilderResult<Self> {
        match tag {
            TrialHandler::TYPE => Ok(TrialHandler::new(name, "random", 1).into()),
            StairHandler::TYPE => Ok(StairHandler::new(name, 50, 0.5).into()),
            other => Err(BuilderError::UnknownComponentType(other.to_string())),
        }
    }

    /// Value of the `name` param.
    pub fn name(&self) -> String {
        self.params().text("name")
    }

    /// Document tag of the handler type.
    pub fn loop_type(&self) -> &'static str {
        match self {
            Loop::Trials(_) => TrialHandler::TYPE,
            Loop::Staircase(_) => StairHandler::TYPE,
        }
    }

    /// All params, `name` first.
    pub fn params(&self) -> &ParamSet {
        match self {
            Loop::Trials(h) => &h.params,
            Loop::Staircase(h) => &h.params,
        }
    }

    /// Mutable params, `name` included. The flow keys loops by name, so outside
    /// the crate renaming goes through `Flow::rename_loop`.
    pub(crate) fn params_mut(&mut self) -> &mut ParamSet {
        match self {
            Loop::Trials(h) => &mut h.params,
            Loop::Staircase(h) => &mut h.params,
        }
    }

    /// Mutable access to one param. `name` is not editable here.
    pub fn param_mut(&mut self, param: &str) -> Option<&mut Param> {
        if param == "name" {
            return None;
        }
        self.params_mut().get_mut(param)
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        if let Some(param) = self.params_mut().get_mut("name") {
            param.value = Value::from(name);
        }
    }

    /// Per-iteration variable name.
    pub fn alias(&self) -> String {
        iteration_alias(&self.name())
    }

    /// Handler construction, written once before the flow runs.
    pub fn write_init_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        match self {
            Loop::Trials(h) => h.write_init_code(writer),
            Loop::Staircase(h) => h.write_init_code(writer),
        }
    }

    /// The `for` header. Leaves the writer one level deeper.
    pub fn write_loop_start_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        let name = self.params().render("name")?;
        debug!(loop_name = %name, level = writer.indent_level(), "opening loop");
        writer.blank_line();
        writer.write_indented(&format!("for {} in {name}:\n", self.alias()));
        writer.set_indent_level(1, true);
        Ok(())
    }

    /// Closes the body opened by [`Loop::write_loop_start_code`] and saves data.
    pub fn write_loop_end_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        writer.set_indent_level(-1, true);
        match self {
            Loop::Trials(h) => h.write_loop_end_code(writer),
            Loop::Staircase(h) => h.write_loop_end_code(writer),
        }
    }
}
