//! User-written code inserted verbatim at each phase of the script.

use crate::component::Component;
use crate::error::BuilderResult;
use crate::param::{Param, ParamSet, UpdatePolicy, ValueKind};
use crate::value::Value;
use crate::writer::IndentedWriter;

/// Param holding code run before the flow starts.
pub const BEGIN_EXPERIMENT: &str = "Begin Experiment";
/// Param holding code run when the routine starts.
pub const BEGIN_ROUTINE: &str = "Begin Routine";
/// Param holding code run on every frame.
pub const EACH_FRAME: &str = "Each Frame";
/// Param holding code run when the routine ends.
pub const END_ROUTINE: &str = "End Routine";

/// Component whose output is whatever code the user typed for each phase.
#[derive(Debug, Clone)]
pub struct CodeComponent {
    params: ParamSet,
}

impl CodeComponent {
    /// Type tag.
    pub const TYPE: &'static str = "CodeComponent";

    /// New component with an empty body and a one-second interval.
    pub fn new(name: &str) -> Self {
        let mut params = ParamSet::new();
        params.insert(
            "name",
            Param::new(name, ValueKind::Code).with_hint("Name of this component"),
        );
        params.insert(
            "times",
            Param::new(
                Value::List(vec![Value::Float(0.0), Value::Float(1.0)]),
                ValueKind::Code,
            )
            .with_allowed_kinds(&[ValueKind::Code, ValueKind::Numeric])
            .with_hint("Start and end times (s) of this component within the routine"),
        );
        for (phase, hint) in [
            (BEGIN_EXPERIMENT, "Code run once, before the experiment starts"),
            (BEGIN_ROUTINE, "Code run at the start of every repeat of the routine"),
            (EACH_FRAME, "Code run on every screen refresh"),
            (END_ROUTINE, "Code run at the end of every repeat of the routine"),
        ] {
            params.insert(
                phase,
                Param::new("", ValueKind::Code)
                    .with_allowed_kinds(&[ValueKind::Code])
                    .with_updates(UpdatePolicy::Constant, &[UpdatePolicy::Constant])
                    .with_hint(hint),
            );
        }
        Self { params }
    }

    /// Catalog constructor.
    pub fn boxed(name: &str) -> Box<dyn Component> {
        Box::new(Self::new(name))
    }

    /// Set the time interval, e.g. `[0.5, 2.0]`.
    pub fn with_times(mut self, times: impl Into<Value>) -> Self {
        if let Some(param) = self.params.get_mut("times") {
            param.value = times.into();
        }
        self
    }

    /// Set the code for one phase.
    pub fn with_code(mut self, phase: &str, code: &str) -> Self {
        match self.params.get_mut(phase) {
            Some(param) => param.value = Value::from(code),
            None => {
                self.params.insert(phase, Param::new(code, ValueKind::Code));
            }
        }
        self
    }

    fn write_phase(&self, phase: &str, writer: &mut IndentedWriter) {
        let code = self.params.text(phase);
        if !code.trim().is_empty() {
            writer.write_lines(&code);
        }
    }
}

impl Component for CodeComponent {
    fn component_type(&self) -> &str {
        Self::TYPE
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn write_init_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        self.write_phase(BEGIN_EXPERIMENT, writer);
        Ok(())
    }

    fn write_routine_start_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        self.write_phase(BEGIN_ROUTINE, writer);
        Ok(())
    }

    fn write_frame_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        self.write_phase(EACH_FRAME, writer);
        Ok(())
    }

    fn write_routine_end_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        self.write_phase(END_ROUTINE, writer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_written_at_the_current_indent() {
        let comp = CodeComponent::new("code")
            .with_code(BEGIN_ROUTINE, "count = 0")
            .with_code(EACH_FRAME, "count += 1\nif count > 10:\n    pass");
        let mut w = IndentedWriter::new();
        comp.write_routine_start_code(&mut w).unwrap();
        w.indented(|w| comp.write_frame_code(w)).unwrap();
        assert_eq!(
            w.as_str(),
            "count = 0\n    count += 1\n    if count > 10:\n        pass\n"
        );
    }

    #[test]
    fn empty_phases_write_nothing() {
        let comp = CodeComponent::new("code");
        let mut w = IndentedWriter::new();
        comp.write_init_code(&mut w).unwrap();
        comp.write_routine_end_code(&mut w).unwrap();
        assert!(w.as_str().is_empty());
    }

    #[test]
    fn custom_times_are_exposed() {
        let comp = CodeComponent::new("code").with_times(Value::List(vec![
            Value::Float(0.5),
            Value::Float(2.0),
        ]));
        let times = comp.time_interval().unwrap();
        assert_eq!(times.value.numbers(), Ok(vec![0.5, 2.0]));
    }
}
