//! The flow: the ordered timeline of routines and loop markers.
//!
//! Loops are not stored as nested trees. Each loop contributes a
//! [`FlowElement::LoopInitiator`] and a [`FlowElement::LoopTerminator`] to a flat
//! list, and the pair brackets whatever sits between them. A well-formed flow
//! brackets like parentheses: every terminator closes the innermost open loop
//! and no loop is left open.
//!
//! Code is written in two passes over the same list:
//!
//! 1. init: loop handlers are constructed and routines declare their clocks
//!    and components;
//! 2. main: initiators open `for` blocks, routines write their timing loops,
//!    terminators close the blocks and save data.
//!
//! The bracketing is checked with a stack that only lives for the duration of
//! one pass (see `LoopStack`), so a failed pass never leaves state behind.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{BuilderError, BuilderResult};
use crate::loops::Loop;
use crate::routine::Routine;
use crate::writer::IndentedWriter;

/// Runtime library every loop handler needs.
pub const LOOP_LIBRARY: &str = "data";

/// One entry in the flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "name")]
pub enum FlowElement {
    /// Reference to an experiment routine by name
    Routine(String),
    /// Start of the named loop's body
    LoopInitiator(String),
    /// End of the named loop's body
    LoopTerminator(String),
}

impl FlowElement {
    /// Type tag as used by name lookups and documents.
    pub fn element_type(&self) -> &'static str {
        match self {
            FlowElement::Routine(_) => "Routine",
            FlowElement::LoopInitiator(_) => "LoopInitiator",
            FlowElement::LoopTerminator(_) => "LoopTerminator",
        }
    }

    /// Routine or loop name the element refers to.
    pub fn name(&self) -> &str {
        match self {
            FlowElement::Routine(name)
            | FlowElement::LoopInitiator(name)
            | FlowElement::LoopTerminator(name) => name,
        }
    }

    /// True for initiators and terminators.
    pub fn is_loop_marker(&self) -> bool {
        !matches!(self, FlowElement::Routine(_))
    }
}

/// Loops currently open during one pass over the flow, innermost last.
#[derive(Debug, Default)]
struct LoopStack<'a> {
    open: Vec<&'a str>,
    max_depth: usize,
}

impl<'a> LoopStack<'a> {
    fn open(&mut self, name: &'a str) {
        self.open.push(name);
        self.max_depth = self.max_depth.max(self.open.len());
    }

    fn close(&mut self, name: &str) -> BuilderResult<()> {
        match self.open.last() {
            Some(top) if *top == name => {
                self.open.pop();
                Ok(())
            }
            Some(top) => Err(BuilderError::malformed_flow(
                name,
                format!("terminator found while loop '{top}' is still open inside it"),
            )),
            None => Err(BuilderError::malformed_flow(
                name,
                "terminator without a matching initiator",
            )),
        }
    }

    fn finish(self) -> BuilderResult<usize> {
        match self.open.last() {
            Some(name) => Err(BuilderError::malformed_flow(*name, "loop is never terminated")),
            None => Ok(self.max_depth),
        }
    }
}

/// Timeline of routines and loops.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    elements: Vec<FlowElement>,
    loops: IndexMap<String, Loop>,
}

impl Flow {
    /// Empty flow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements in order.
    pub fn elements(&self) -> &[FlowElement] {
        &self.elements
    }

    /// Number of elements, markers included.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the flow has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Registered loops in insertion order.
    pub fn loops(&self) -> impl Iterator<Item = &Loop> {
        self.loops.values()
    }

    /// Loop by name.
    pub fn get_loop(&self, name: &str) -> Option<&Loop> {
        self.loops.get(name)
    }

    /// Loop by name, mutably. Renaming goes through [`Flow::rename_loop`].
    pub fn get_loop_mut(&mut self, name: &str) -> Option<&mut Loop> {
        self.loops.get_mut(name)
    }

    /// Bracket the elements `start..end` with a new loop.
    ///
    /// The terminator goes in at `end` first so that `start` still refers to
    /// the original positions; both are clamped to the flow length. `start`
    /// must not exceed `end`. A loop with the same name is replaced: its
    /// markers are removed and `start`/`end` are shifted past them. Returns the
    /// runtime library the loop needs.
    pub fn add_loop(&mut self, handler: Loop, mut start: usize, mut end: usize) -> &'static str {
        let name = handler.name();
        if start > end {
            debug!(loop_name = %name, start, end, "loop start is after its end");
        }
        if self.loops.contains_key(&name) {
            warn!(loop_name = %name, "replacing loop with the same name");
            let markers_before = |pos: usize| {
                self.elements
                    .iter()
                    .take(pos)
                    .filter(|e| e.is_loop_marker() && e.name() == name)
                    .count()
            };
            start -= markers_before(start);
            end -= markers_before(end);
            self.remove_loop(&name);
        }
        let end = end.min(self.elements.len());
        self.elements.insert(end, FlowElement::LoopTerminator(name.clone()));
        let start = start.min(self.elements.len());
        self.elements.insert(start, FlowElement::LoopInitiator(name.clone()));
        debug!(loop_name = %name, start, end, "added loop");
        self.loops.insert(name, handler);
        LOOP_LIBRARY
    }

    /// Rename a loop, keeping its markers and registry entry in step.
    pub fn rename_loop(&mut self, old: &str, new: &str) -> BuilderResult<()> {
        if old == new {
            return Ok(());
        }
        if let Some(existing) = self.loops.get(new) {
            return Err(BuilderError::DuplicateName {
                name: new.to_string(),
                owner: existing.loop_type().to_string(),
            });
        }
        if !self.loops.contains_key(old) {
            return Err(BuilderError::malformed_flow(old, "no loop with this name"));
        }
        self.loops = std::mem::take(&mut self.loops)
            .into_iter()
            .map(|(name, mut handler)| {
                if name == old {
                    handler.set_name(new);
                    (new.to_string(), handler)
                } else {
                    (name, handler)
                }
            })
            .collect();
        for element in &mut self.elements {
            match element {
                FlowElement::LoopInitiator(name) | FlowElement::LoopTerminator(name)
                    if *name == old =>
                {
                    *name = new.to_string();
                }
                _ => {}
            }
        }
        debug!(old, new, "renamed loop");
        Ok(())
    }

    /// Insert a routine reference at `pos` (clamped to the flow length).
    pub fn add_routine(&mut self, routine_name: &str, pos: usize) {
        let pos = pos.min(self.elements.len());
        self.elements.insert(pos, FlowElement::Routine(routine_name.to_string()));
    }

    /// Append a loop and its initiator while reading a document.
    pub(crate) fn push_loop_initiator(&mut self, handler: Loop) {
        let name = handler.name();
        self.elements.push(FlowElement::LoopInitiator(name.clone()));
        self.loops.insert(name, handler);
    }

    /// Append a terminator for a loop already pushed.
    pub(crate) fn push_loop_terminator(&mut self, name: &str) -> BuilderResult<()> {
        if !self.loops.contains_key(name) {
            return Err(BuilderError::MalformedDocument(format!(
                "initiator for terminated loop '{name}'"
            )));
        }
        self.elements.push(FlowElement::LoopTerminator(name.to_string()));
        Ok(())
    }

    /// Append a routine reference.
    pub(crate) fn push_routine(&mut self, routine_name: &str) {
        self.elements.push(FlowElement::Routine(routine_name.to_string()));
    }

    /// Remove an element.
    ///
    /// A loop marker removes its whole loop (both markers and the handler). A
    /// routine reference removes the first equal element. Returns false when
    /// nothing matched.
    pub fn remove_component(&mut self, element: &FlowElement) -> bool {
        match element {
            FlowElement::LoopInitiator(name) | FlowElement::LoopTerminator(name) => {
                self.remove_loop(name).is_some()
            }
            FlowElement::Routine(_) => match self.elements.iter().position(|e| e == element) {
                Some(index) => {
                    self.elements.remove(index);
                    true
                }
                None => false,
            },
        }
    }

    /// Remove a loop and both of its markers. The bracketed elements stay.
    pub fn remove_loop(&mut self, name: &str) -> Option<Loop> {
        self.elements.retain(|e| !(e.is_loop_marker() && e.name() == name));
        let removed = self.loops.shift_remove(name);
        if removed.is_some() {
            debug!(loop_name = %name, "removed loop");
        }
        removed
    }

    /// Remove the element at `index` (a marker removes its loop).
    pub fn remove_at(&mut self, index: usize) -> Option<FlowElement> {
        let element = self.elements.get(index)?.clone();
        if element.is_loop_marker() {
            self.remove_loop(element.name());
        } else {
            self.elements.remove(index);
        }
        Some(element)
    }

    /// Remove every reference to a routine. Returns how many were removed.
    pub fn remove_routine_references(&mut self, routine_name: &str) -> usize {
        let before = self.elements.len();
        self.elements.retain(|e| !matches!(e, FlowElement::Routine(name) if name == routine_name));
        before - self.elements.len()
    }

    /// Check the loop bracketing and return the maximum nesting depth.
    pub fn validate(&self) -> BuilderResult<usize> {
        let mut stack = LoopStack::default();
        let mut seen = HashSet::new();
        for element in &self.elements {
            match element {
                FlowElement::LoopInitiator(name) => {
                    if !self.loops.contains_key(name) {
                        return Err(BuilderError::malformed_flow(
                            name,
                            "initiator for an unregistered loop",
                        ));
                    }
                    if !seen.insert(name.as_str()) {
                        return Err(BuilderError::malformed_flow(
                            name,
                            "loop is opened more than once",
                        ));
                    }
                    stack.open(name);
                }
                FlowElement::LoopTerminator(name) => stack.close(name)?,
                FlowElement::Routine(_) => {}
            }
        }
        stack.finish()
    }

    /// Write the init pass, then the main pass.
    pub fn write_code(
        &self,
        writer: &mut IndentedWriter,
        routines: &IndexMap<String, Routine>,
    ) -> BuilderResult<()> {
        let depth = self.validate()?;
        debug!(elements = self.elements.len(), depth, "writing flow");

        for element in &self.elements {
            match element {
                FlowElement::LoopInitiator(name) => self.loop_named(name)?.write_init_code(writer)?,
                FlowElement::LoopTerminator(_) => {}
                FlowElement::Routine(name) => {
                    Self::routine_named(routines, name)?.write_init_code(writer)?
                }
            }
        }

        writer.blank_line();
        writer.write_indented("#Start of the experiment\n");
        let mut stack = LoopStack::default();
        for element in &self.elements {
            match element {
                FlowElement::LoopInitiator(name) => {
                    self.loop_named(name)?.write_loop_start_code(writer)?;
                    stack.open(name);
                }
                FlowElement::LoopTerminator(name) => {
                    stack.close(name)?;
                    self.loop_named(name)?.write_loop_end_code(writer)?;
                }
                FlowElement::Routine(name) => {
                    Self::routine_named(routines, name)?.write_main_code(writer)?
                }
            }
        }
        stack.finish()?;
        Ok(())
    }

    fn loop_named(&self, name: &str) -> BuilderResult<&Loop> {
        self.loops
            .get(name)
            .ok_or_else(|| BuilderError::malformed_flow(name, "loop is not registered"))
    }

    fn routine_named<'r>(
        routines: &'r IndexMap<String, Routine>,
        name: &str,
    ) -> BuilderResult<&'r Routine> {
        routines
            .get(name)
            .ok_or_else(|| {
                BuilderError::malformed_flow(name, "flow references an undefined routine")
            })
    }
}
