//! Routines: ordered components sharing one frame-update loop.
//!
//! A routine writes its components' code around a single timing loop:
//!
//! ```text
//! <routine-start code of every component>
//! while continueTrial and (t<2.5000):
//!     t=trialClock.getTime()
//!     <frame code of every component>
//!     <quit check, event clear, win.flip()>
//! <routine-end code of every component>
//! ```
//!
//! The loop runs until the latest end time declared by any component, see
//! [`Routine::max_time`].

use tracing::debug;

use crate::component::Component;
use crate::error::{BuilderError, BuilderResult};
use crate::value::Value;
use crate::writer::IndentedWriter;

/// A named sequence of timed components.
#[derive(Debug)]
pub struct Routine {
    name: String,
    components: Vec<Box<dyn Component>>,
}

impl Routine {
    /// Empty routine.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    /// Routine name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Components in execution order.
    pub fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True when the routine has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Append a component.
    pub fn add_component(&mut self, component: Box<dyn Component>) {
        self.components.push(component);
    }

    /// Remove the first component with this name.
    pub fn remove_component(&mut self, name: &str) -> Option<Box<dyn Component>> {
        let index = self.components.iter().position(|c| c.name() == name)?;
        Some(self.components.remove(index))
    }

    /// Find a component by name.
    pub fn get_component_from_name(&self, name: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Find a component by name, mutably.
    pub fn get_component_mut(&mut self, name: &str) -> Option<&mut Box<dyn Component>> {
        self.components.iter_mut().find(|c| c.name() == name)
    }

    /// Name of the clock variable in the generated script.
    pub fn clock_name(&self) -> String {
        format!("{}Clock", self.name)
    }

    /// Name of the flag that keeps the timing loop running.
    pub fn continue_name(&self) -> String {
        format!("continue{}", capitalize(&self.name))
    }

    /// Declare the routine clock and let each component initialise itself.
    pub fn write_init_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        writer.blank_line();
        writer.write_indented(&format!("#Initialise components for routine:{}\n", self.name));
        writer.write_indented(&format!("{}=core.Clock()\n", self.clock_name()));
        for component in &self.components {
            component.write_init_code(writer)?;
        }
        Ok(())
    }

    /// Write the routine body: start code, timing loop, end code.
    pub fn write_main_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        let max_time = self.max_time()?;
        let clock = self.clock_name();
        let continue_name = self.continue_name();
        debug!(routine = %self.name, max_time, "writing routine");

        for component in &self.components {
            component.write_routine_start_code(writer)?;
        }

        writer.blank_line();
        writer.write_indented(&format!("#run the routine {}\n", self.name));
        writer.write_indented(&format!("{continue_name}=True\n"));
        writer.write_indented(&format!("t=0; {clock}.reset()\n"));
        writer.write_indented(&format!("while {continue_name} and (t<{max_time:.4}):\n"));
        writer.indented(|w| -> BuilderResult<()> {
            w.write_indented("#get current time\n");
            w.write_indented(&format!("t={clock}.getTime()\n"));
            w.blank_line();
            w.write_indented("#update each component (where necessary)\n");
            for component in &self.components {
                component.write_frame_code(w)?;
            }
            w.blank_line();
            w.write_indented("#check for quit (the [Esc] key)\n");
            w.write_indented("if event.getKeys(\"escape\"): core.quit()\n");
            w.write_indented("event.clearEvents()#so that it doesn't get clogged with other events\n");
            w.write_indented("#refresh the screen\n");
            w.write_indented("win.flip()\n");
            Ok(())
        })?;

        writer.blank_line();
        writer.write_indented(&format!("#end of routine {}\n", self.name));
        for component in &self.components {
            component.write_routine_end_code(writer)?;
        }
        Ok(())
    }

    /// Latest end time declared by any component, in seconds.
    ///
    /// Each component's `times` param is read as a literal (a number or a
    /// possibly nested list of numbers) and its largest number taken. Components
    /// without a `times` param do not contribute. An empty routine lasts 0 s.
    pub fn max_time(&self) -> BuilderResult<f64> {
        let mut max_time = 0.0_f64;
        for component in &self.components {
            let Some(times) = component.time_interval() else {
                continue;
            };
            let evaluation_error = |reason: String| BuilderError::CodeEvaluation {
                routine: self.name.clone(),
                component: component.name(),
                reason,
            };
            let parsed;
            let value = match &times.value {
                Value::Str(text) => {
                    parsed = Value::parse_literal(text)
                        .map_err(|e| evaluation_error(e.to_string()))?;
                    &parsed
                }
                other => other,
            };
            for end in value.numbers().map_err(evaluation_error)? {
                max_time = max_time.max(end);
            }
        }
        Ok(max_time)
    }
}

/// Upper-case the first character and lower-case the rest.
pub(crate) fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::code::{CodeComponent, EACH_FRAME};

    fn timed(name: &str, end: f64) -> Box<dyn Component> {
        Box::new(CodeComponent::new(name).with_times(Value::List(vec![
            Value::Float(0.0),
            Value::Float(end),
        ])))
    }

    #[test]
    fn max_time_is_latest_end() {
        let mut routine = Routine::new("trial");
        routine.add_component(timed("a", 1.0));
        routine.add_component(timed("b", 2.5));
        routine.add_component(timed("c", 0.3));
        assert_eq!(routine.max_time().unwrap(), 2.5);
    }

    #[test]
    fn max_time_parses_textual_intervals() {
        let mut routine = Routine::new("trial");
        routine.add_component(Box::new(
            CodeComponent::new("a").with_times("[[0, 0.5], [1, 1.75]]"),
        ));
        assert_eq!(routine.max_time().unwrap(), 1.75);
    }

    #[test]
    fn max_time_rejects_non_numeric_intervals() {
        let mut routine = Routine::new("trial");
        routine.add_component(Box::new(
            CodeComponent::new("beep").with_times("[0, os.system('x')]"),
        ));
        match routine.max_time() {
            Err(BuilderError::CodeEvaluation {
                routine, component, ..
            }) => {
                assert_eq!(routine, "trial");
                assert_eq!(component, "beep");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn main_code_restores_indent() {
        let mut routine = Routine::new("trial");
        routine.add_component(Box::new(
            CodeComponent::new("code").with_code(EACH_FRAME, "frames += 1"),
        ));
        let mut w = IndentedWriter::new();
        w.set_indent_level(1, false);
        routine.write_main_code(&mut w).unwrap();
        assert_eq!(w.indent_level(), 1);
        let text = w.as_str();
        assert!(text.contains("    while continueTrial and (t<1.0000):\n"));
        assert!(text.contains("        t=trialClock.getTime()\n"));
        assert!(text.contains("        frames += 1\n"));
        assert!(text.contains("        win.flip()\n"));
    }

    #[test]
    fn names_derive_from_routine_name() {
        let routine = Routine::new("instructions");
        assert_eq!(routine.clock_name(), "instructionsClock");
        assert_eq!(routine.continue_name(), "continueInstructions");
        assert_eq!(capitalize("myTrial"), "Mytrial");
        assert_eq!(capitalize(""), "");
    }
}
