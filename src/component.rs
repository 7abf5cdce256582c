//! The component protocol and the catalog of constructible component types.
//!
//! The builder core depends only on the [`Component`] trait. Concrete stimulus
//! and response types live outside this crate and plug in by implementing it
//! and registering a constructor with a [`ComponentCatalog`], which is what the
//! document loader uses to rebuild routines from their type tags.

use indexmap::IndexMap;
use std::fmt;

use crate::components::code::CodeComponent;
use crate::error::{BuilderError, BuilderResult};
use crate::param::{Param, ParamSet};
use crate::writer::IndentedWriter;

/// A timed stimulus or response unit placed in a routine.
///
/// Every hook has an empty default so components only implement the phases
/// they take part in.
pub trait Component: fmt::Debug {
    /// Type tag, also used as the element name in experiment documents.
    fn component_type(&self) -> &str;

    /// All params, `name` first.
    fn params(&self) -> &ParamSet;

    /// Mutable access for editors and the document loader.
    fn params_mut(&mut self) -> &mut ParamSet;

    /// Value of the `name` param.
    fn name(&self) -> String {
        self.params().text("name")
    }

    /// Code run once before the flow starts (create stimuli, etc).
    fn write_init_code(&self, _writer: &mut IndentedWriter) -> BuilderResult<()> {
        Ok(())
    }

    /// Code run at the start of every repeat of the owning routine.
    fn write_routine_start_code(&self, _writer: &mut IndentedWriter) -> BuilderResult<()> {
        Ok(())
    }

    /// Code run on every frame of the routine's timing loop.
    fn write_frame_code(&self, _writer: &mut IndentedWriter) -> BuilderResult<()> {
        Ok(())
    }

    /// Code run after the routine's timing loop ends.
    fn write_routine_end_code(&self, _writer: &mut IndentedWriter) -> BuilderResult<()> {
        Ok(())
    }

    /// The time-interval param used to size the routine's timing loop.
    fn time_interval(&self) -> Option<&Param> {
        self.params().get("times")
    }
}

/// Constructor registered for a component type. Receives the component name.
pub type ComponentFactory = fn(&str) -> Box<dyn Component>;

/// Registry of component constructors keyed by type tag.
#[derive(Clone)]
pub struct ComponentCatalog {
    factories: IndexMap<String, ComponentFactory>,
}

impl fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ComponentCatalog {
    /// Catalog with no types registered.
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Catalog with the components shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(CodeComponent::TYPE, CodeComponent::boxed);
        catalog
    }

    /// Register (or replace) a constructor.
    pub fn register(&mut self, component_type: impl Into<String>, factory: ComponentFactory) {
        self.factories.insert(component_type.into(), factory);
    }

    /// Build a default-configured component of the given type.
    pub fn create(&self, component_type: &str, name: &str) -> BuilderResult<Box<dyn Component>> {
        self.factories
            .get(component_type)
            .map(|factory| factory(name))
            .ok_or_else(|| BuilderError::UnknownComponentType(component_type.to_string()))
    }

    /// Registered type tags in registration order.
    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
