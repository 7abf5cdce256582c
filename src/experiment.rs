//! The experiment aggregate and script generation entry point.
//!
//! An [`Experiment`] owns exactly one [`Flow`], the routines the flow refers
//! to by name, the experiment-wide [`Settings`] and the list of runtime
//! libraries the generated script imports. [`Experiment::write_script`] ties
//! them together:
//!
//! ```text
//! <citation comment and imports>
//! <settings start code: info dialog, files, window>
//! <flow init pass>
//! <flow main pass>
//! <settings end code>
//! ```

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::component::ComponentCatalog;
use crate::config::{BuilderConfig, CodegenConfig};
use crate::error::{BuilderError, BuilderResult};
use crate::flow::Flow;
use crate::loops::Loop;
use crate::routine::Routine;
use crate::settings::Settings;
use crate::writer::IndentedWriter;

/// Version written into experiment documents.
pub const BUILDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Libraries every script imports.
pub const DEFAULT_LIBS: [&str; 3] = ["core", "data", "event"];

/// Names usable as variables in the generated script.
static IDENTIFIER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier regex"));

/// A complete experiment: settings, routines and the flow that orders them.
#[derive(Debug)]
pub struct Experiment {
    pub(crate) name: Option<String>,
    pub(crate) version: String,
    pub(crate) flow: Flow,
    pub(crate) routines: IndexMap<String, Routine>,
    pub(crate) settings: Settings,
    pub(crate) required_libs: Vec<String>,
    pub(crate) catalog: ComponentCatalog,
    pub(crate) codegen: CodegenConfig,
    pub(crate) encoding: String,
}

impl Default for Experiment {
    fn default() -> Self {
        Self::new()
    }
}

impl Experiment {
    /// Empty experiment with default configuration and the built-in catalog.
    pub fn new() -> Self {
        Self::with_config(&BuilderConfig::default())
    }

    /// Empty experiment using the code generation and document settings of `config`.
    pub fn with_config(config: &BuilderConfig) -> Self {
        Self {
            name: None,
            version: BUILDER_VERSION.to_string(),
            flow: Flow::new(),
            routines: IndexMap::new(),
            settings: Settings::new(),
            required_libs: DEFAULT_LIBS.iter().map(|s| s.to_string()).collect(),
            catalog: ComponentCatalog::default(),
            codegen: config.codegen.clone(),
            encoding: config.document.encoding.clone(),
        }
    }

    /// Replace the component catalog used when loading documents.
    pub fn with_catalog(mut self, catalog: ComponentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Experiment name, if set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the name on the experiment and in its settings.
    pub fn set_exp_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
        self.settings.set_exp_name(name);
    }

    /// Version of the builder that created (or loaded) the experiment.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The flow.
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// The flow, mutably.
    pub fn flow_mut(&mut self) -> &mut Flow {
        &mut self.flow
    }

    /// Experiment-wide settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Experiment-wide settings, mutably.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Catalog used to rebuild components from documents.
    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    /// Routines keyed by name, in insertion order.
    pub fn routines(&self) -> &IndexMap<String, Routine> {
        &self.routines
    }

    /// Routine by name.
    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.get(name)
    }

    /// Routine by name, mutably.
    pub fn routine_mut(&mut self, name: &str) -> Option<&mut Routine> {
        self.routines.get_mut(name)
    }

    /// Runtime libraries imported by the script, in order.
    pub fn required_libs(&self) -> &[String] {
        &self.required_libs
    }

    /// Add runtime libraries the script needs. Already present ones are skipped.
    pub fn require_libs(&mut self, libs: &[&str]) {
        for lib in libs {
            if !self.required_libs.iter().any(|l| l == lib) {
                debug!(lib, "requiring library");
                self.required_libs.push(lib.to_string());
            }
        }
    }

    /// Store a routine under `name`, creating an empty one when none is given.
    ///
    /// An existing routine with the same name is replaced and returned.
    pub fn add_routine(&mut self, name: &str, routine: Option<Routine>) -> Option<Routine> {
        let routine = routine.unwrap_or_else(|| Routine::new(name));
        let previous = self.routines.insert(name.to_string(), routine);
        if previous.is_some() {
            warn!(routine = name, "replaced existing routine");
        }
        previous
    }

    /// Like [`Experiment::add_routine`] but refuses to replace an existing routine.
    pub fn try_add_routine(&mut self, name: &str, routine: Option<Routine>) -> BuilderResult<()> {
        if self.routines.contains_key(name) {
            return Err(BuilderError::DuplicateName {
                name: name.to_string(),
                owner: "Routine".to_string(),
            });
        }
        self.add_routine(name, routine);
        Ok(())
    }

    /// Remove a routine and every flow reference to it.
    pub fn remove_routine(&mut self, name: &str) -> Option<Routine> {
        let removed = self.routines.shift_remove(name)?;
        let references = self.flow.remove_routine_references(name);
        debug!(routine = name, references, "removed routine");
        Some(removed)
    }

    /// Bracket flow elements `start..end` with a loop and require its library.
    pub fn add_loop(&mut self, handler: Loop, start: usize, end: usize) {
        let lib = self.flow.add_loop(handler, start, end);
        self.require_libs(&[lib]);
    }

    /// Rename a loop after checking the new name is free and valid.
    pub fn rename_loop(&mut self, old: &str, new: &str) -> BuilderResult<()> {
        if old == new {
            return Ok(());
        }
        self.check_name(new)?;
        self.flow.rename_loop(old, new)
    }

    /// Type tag of whatever already uses `name`, if anything.
    ///
    /// Loops are searched first, then routines, then the components of each
    /// routine.
    pub fn get_used_name(&self, name: &str) -> Option<String> {
        if let Some(found) = self.flow.get_loop(name) {
            return Some(found.loop_type().to_string());
        }
        if self.routines.contains_key(name) {
            return Some("Routine".to_string());
        }
        self.routines
            .values()
            .flat_map(|r| r.components())
            .find(|c| c.name() == name)
            .map(|c| c.component_type().to_string())
    }

    /// Check that `name` is a valid identifier not used by anything else.
    pub fn check_name(&self, name: &str) -> BuilderResult<()> {
        if !IDENTIFIER_REGEX.is_match(name) {
            return Err(BuilderError::InvalidName(name.to_string()));
        }
        match self.get_used_name(name) {
            Some(owner) => Err(BuilderError::DuplicateName {
                name: name.to_string(),
                owner,
            }),
            None => Ok(()),
        }
    }

    /// Generate the complete script.
    ///
    /// Generation does not modify the experiment, so repeated calls give
    /// identical output.
    pub fn write_script(&self) -> BuilderResult<String> {
        let mut writer = IndentedWriter::with_indent_width(self.codegen.indent_width);

        let mut libs: Vec<&str> = self.required_libs.iter().map(String::as_str).collect();
        for lib in self.settings.required_libs() {
            if !libs.contains(&lib) {
                libs.push(lib);
            }
        }

        writer.write_indented(
            "#This experiment was created using the trialflow experiment builder\n",
        );
        writer.write_indented(
            "#If you publish work using this script please cite the relevant papers (e.g. Peirce, 2007;2009)\n",
        );
        writer.blank_line();
        writer.write_indented("from numpy import * #many different maths functions\n");
        writer.write_indented("import os #handy system and path functions\n");
        writer.write_indented(&format!("from psychopy import {}\n", libs.join(", ")));
        writer.write_indented(
            "import psychopy.log #import like this so it doesn't interfere with numpy.log\n",
        );
        writer.blank_line();

        self.settings.write_start_code(&mut writer)?;
        self.flow.write_code(&mut writer, &self.routines)?;
        self.settings.write_end_code(&mut writer)?;

        let script = writer.into_string();
        info!(
            routines = self.routines.len(),
            flow_elements = self.flow.len(),
            bytes = script.len(),
            "generated script"
        );
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::CodeComponent;
    use crate::loops::TrialHandler;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn add_routine_overwrites_and_warns() {
        let mut exp = Experiment::new();
        assert!(exp.add_routine("trial", None).is_none());
        let mut replacement = Routine::new("trial");
        replacement.add_component(Box::new(CodeComponent::new("code")));
        let previous = exp.add_routine("trial", Some(replacement));
        assert!(previous.unwrap().is_empty());
        assert_eq!(exp.routine("trial").unwrap().len(), 1);
        assert!(logs_contain("replaced existing routine"));
    }

    #[test]
    fn try_add_routine_rejects_duplicates() {
        let mut exp = Experiment::new();
        exp.try_add_routine("trial", None).unwrap();
        assert!(matches!(
            exp.try_add_routine("trial", None),
            Err(BuilderError::DuplicateName { .. })
        ));
    }

    #[test]
    fn require_libs_dedups_in_order() {
        let mut exp = Experiment::new();
        exp.require_libs(&["visual", "data", "sound", "visual"]);
        assert_eq!(
            exp.required_libs(),
            &["core", "data", "event", "visual", "sound"]
        );
    }

    #[test]
    fn add_loop_requires_data_library() {
        let mut exp = Experiment::new();
        exp.required_libs.clear();
        exp.add_routine("trial", None);
        exp.flow_mut().add_routine("trial", 0);
        exp.add_loop(TrialHandler::new("trials", "random", 2).into(), 0, 1);
        assert_eq!(exp.required_libs(), &["data"]);
    }

    #[test]
    fn used_names_cover_loops_routines_and_components() {
        let mut exp = Experiment::new();
        let mut routine = Routine::new("trial");
        routine.add_component(Box::new(CodeComponent::new("setup")));
        exp.add_routine("trial", Some(routine));
        exp.flow_mut().add_routine("trial", 0);
        exp.add_loop(TrialHandler::new("trials", "random", 2).into(), 0, 1);

        assert_eq!(exp.get_used_name("trials").as_deref(), Some("TrialHandler"));
        assert_eq!(exp.get_used_name("trial").as_deref(), Some("Routine"));
        assert_eq!(exp.get_used_name("setup").as_deref(), Some("CodeComponent"));
        assert_eq!(exp.get_used_name("free"), None);
    }

    #[test]
    fn check_name_rejects_bad_and_used_names() {
        let mut exp = Experiment::new();
        exp.add_routine("trial", None);
        assert!(exp.check_name("stim_1").is_ok());
        assert!(matches!(exp.check_name("1stim"), Err(BuilderError::InvalidName(_))));
        assert!(matches!(exp.check_name("my stim"), Err(BuilderError::InvalidName(_))));
        assert!(matches!(
            exp.check_name("trial"),
            Err(BuilderError::DuplicateName { owner, .. }) if owner == "Routine"
        ));
    }

    #[test]
    fn rename_loop_moves_the_used_name() {
        let mut exp = Experiment::new();
        let mut routine = Routine::new("trial");
        routine.add_component(Box::new(CodeComponent::new("setup")));
        exp.add_routine("trial", Some(routine));
        exp.flow_mut().add_routine("trial", 0);
        exp.add_loop(TrialHandler::new("trials", "random", 2).into(), 0, 1);

        exp.rename_loop("trials", "blocks").unwrap();
        assert_eq!(exp.get_used_name("blocks").as_deref(), Some("TrialHandler"));
        assert_eq!(exp.get_used_name("trials"), None);

        assert!(matches!(
            exp.rename_loop("blocks", "setup"),
            Err(BuilderError::DuplicateName { owner, .. }) if owner == "CodeComponent"
        ));
        assert!(matches!(
            exp.rename_loop("blocks", "2blocks"),
            Err(BuilderError::InvalidName(_))
        ));
        assert!(exp.flow().get_loop("blocks").is_some());
    }

    #[test]
    fn remove_routine_strips_flow_references() {
        let mut exp = Experiment::new();
        exp.add_routine("a", None);
        exp.add_routine("b", None);
        exp.flow_mut().add_routine("a", 0);
        exp.flow_mut().add_routine("b", 1);
        exp.flow_mut().add_routine("a", 2);
        assert!(exp.remove_routine("a").is_some());
        assert_eq!(exp.flow().len(), 1);
        assert!(exp.write_script().is_ok());
    }

    #[test]
    fn script_imports_settings_libraries() {
        let mut exp = Experiment::new();
        exp.set_exp_name("demo");
        let script = exp.write_script().unwrap();
        assert!(script.contains("from psychopy import core, data, event, visual, gui\n"));
        assert!(script.contains("expName='demo'"));
        assert!(script.ends_with("core.quit()\n"));
    }

    #[test]
    fn indent_width_follows_config() {
        let mut config = BuilderConfig::default();
        config.codegen.indent_width = 2;
        let mut exp = Experiment::with_config(&config);
        exp.add_routine("trial", None);
        exp.flow_mut().add_routine("trial", 0);
        exp.add_loop(TrialHandler::new("trials", "random", 1).into(), 0, 1);
        let script = exp.write_script().unwrap();
        assert!(script.contains("\n  while continueTrial and (t<0.0000):\n"));
        assert!(script.contains("\n    t=trialClock.getTime()\n"));
    }
}
