//! XML serialization for saving and loading experiments.
//!
//! Document layout:
//!
//! ```xml
//! <TrialflowExperiment version="0.1.0" formatVersion="1" encoding="utf-8">
//!   <Settings>
//!     <Param name="expName" val="'stroop'" valType="str" updates="constant"/>
//!   </Settings>
//!   <Routines>
//!     <Routine name="trial">
//!       <CodeComponent name="setup">
//!         <Param name="times" val="[0.0, 1.0]" valType="code" updates="constant"/>
//!       </CodeComponent>
//!     </Routine>
//!   </Routines>
//!   <Flow>
//!     <TrialHandler name="trials">
//!       <Param name="nReps" val="5" valType="num" updates="constant"/>
//!     </TrialHandler>
//!     <Routine name="trial"/>
//!     <LoopTerminator name="trials"/>
//!   </Flow>
//! </TrialflowExperiment>
//! ```
//!
//! Every `val` attribute holds the value's literal form, so condition lists
//! and interval lists read back as structured values. Values that do not parse
//! as a literal (hand-edited documents) are kept as plain strings.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::config::BuilderConfig;
use crate::error::{BuilderError, BuilderResult};
use crate::experiment::Experiment;
use crate::flow::{FlowElement, LOOP_LIBRARY};
use crate::loops::Loop;
use crate::param::{Param, ParamSet, UpdatePolicy, ValueKind};
use crate::routine::Routine;
use crate::value::Value;

/// Root element name.
pub const ROOT_TAG: &str = "TrialflowExperiment";

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

/// File extension for experiment documents.
pub const DOCUMENT_EXTENSION: &str = "tfexp";

const SETTINGS_TAG: &str = "Settings";
const ROUTINES_TAG: &str = "Routines";
const FLOW_TAG: &str = "Flow";
const PARAM_TAG: &str = "Param";
const ROUTINE_TAG: &str = "Routine";
const TERMINATOR_TAG: &str = "LoopTerminator";

fn element_with_name(tag: &str, name: &str) -> Element {
    let mut element = Element::new(tag);
    element.attributes.insert("name".to_string(), name.to_string());
    element
}

fn param_element(name: &str, param: &Param) -> Element {
    let mut element = element_with_name(PARAM_TAG, name);
    element.attributes.insert("val".to_string(), param.value.to_literal());
    element.attributes.insert("valType".to_string(), param.kind.tag().to_string());
    element.attributes.insert("updates".to_string(), param.updates.tag().to_string());
    element
}

fn push_params(parent: &mut Element, params: &ParamSet) {
    for (name, param) in params.iter() {
        parent.children.push(XMLNode::Element(param_element(name, param)));
    }
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

fn required_child<'a>(element: &'a Element, tag: &str) -> BuilderResult<&'a Element> {
    element
        .get_child(tag)
        .ok_or_else(|| BuilderError::MalformedDocument(format!("<{tag}> in <{}>", element.name)))
}

fn required_attr<'a>(element: &'a Element, attr: &str) -> BuilderResult<&'a str> {
    element
        .attributes
        .get(attr)
        .map(String::as_str)
        .ok_or_else(|| {
            BuilderError::MalformedDocument(format!("attribute '{attr}' on <{}>", element.name))
        })
}

/// Parse a `val` attribute, keeping unparseable text as a string.
fn parse_val(text: &str) -> Value {
    Value::parse_literal(text).unwrap_or_else(|_| Value::Str(text.to_string()))
}

/// Apply every `<Param>` child of `element` to `params`.
///
/// Known params keep their metadata (hint, allowed values) and take the stored
/// value, kind and update policy, which must be among the allowed ones.
/// Unknown params are added as they are.
fn read_params(element: &Element, params: &mut ParamSet) -> BuilderResult<()> {
    let owner = element
        .attributes
        .get("name")
        .map_or(element.name.as_str(), String::as_str);
    for node in child_elements(element).filter(|e| e.name == PARAM_TAG) {
        let name = required_attr(node, "name")?;
        let value = parse_val(required_attr(node, "val")?);
        let kind = node.attributes.get("valType").map(|t| ValueKind::from_tag(t));
        let updates = match node.attributes.get("updates") {
            Some(tag) => match UpdatePolicy::from_tag(tag) {
                Some(policy) => Some(policy),
                None => {
                    warn!(param = name, updates = %tag, "unknown update policy, keeping default");
                    None
                }
            },
            None => None,
        };

        match params.get_mut(name) {
            Some(param) => {
                let invalid = |reason: String| BuilderError::InvalidParam {
                    owner: owner.to_string(),
                    param: name.to_string(),
                    reason,
                };
                if let Some(kind) = &kind {
                    if !param.accepts_kind(kind) {
                        return Err(invalid(format!("kind '{kind}' is not allowed")));
                    }
                }
                if let Some(updates) = updates {
                    if !param.accepts_updates(updates) {
                        let tag = updates.tag();
                        return Err(invalid(format!("update policy '{tag}' is not allowed")));
                    }
                }
                param.value = value;
                if let Some(kind) = kind {
                    param.kind = kind;
                }
                if let Some(updates) = updates {
                    param.updates = updates;
                }
            }
            None => {
                debug!(param = name, "adding param not in the defaults");
                let mut param = Param::new(value, kind.unwrap_or(ValueKind::Str));
                param.updates = updates.unwrap_or_default();
                params.insert(name, param);
            }
        }
    }
    Ok(())
}

impl Experiment {
    /// Build the document tree.
    pub fn to_xml_element(&self) -> Element {
        let mut root = Element::new(ROOT_TAG);
        root.attributes.insert("version".to_string(), self.version.clone());
        root.attributes.insert("formatVersion".to_string(), FORMAT_VERSION.to_string());
        root.attributes.insert("encoding".to_string(), self.encoding.clone());

        let mut settings = Element::new(SETTINGS_TAG);
        push_params(&mut settings, self.settings.params());
        root.children.push(XMLNode::Element(settings));

        let mut routines = Element::new(ROUTINES_TAG);
        for (name, routine) in &self.routines {
            let mut routine_node = element_with_name(ROUTINE_TAG, name);
            for component in routine.components() {
                let mut component_node =
                    element_with_name(component.component_type(), &component.name());
                push_params(&mut component_node, component.params());
                routine_node.children.push(XMLNode::Element(component_node));
            }
            routines.children.push(XMLNode::Element(routine_node));
        }
        root.children.push(XMLNode::Element(routines));

        let mut flow = Element::new(FLOW_TAG);
        for element in self.flow.elements() {
            let node = match element {
                FlowElement::LoopInitiator(name) => {
                    let Some(handler) = self.flow.get_loop(name) else {
                        warn!(loop_name = %name, "skipping initiator of unregistered loop");
                        continue;
                    };
                    let mut node = element_with_name(handler.loop_type(), &handler.name());
                    push_params(&mut node, handler.params());
                    node
                }
                FlowElement::LoopTerminator(name) => element_with_name(TERMINATOR_TAG, name),
                FlowElement::Routine(name) => element_with_name(ROUTINE_TAG, name),
            };
            flow.children.push(XMLNode::Element(node));
        }
        root.children.push(XMLNode::Element(flow));
        root
    }

    /// Write the document to any writer.
    pub fn write_xml<W: Write>(&self, writer: W) -> BuilderResult<()> {
        let config = EmitterConfig::new().perform_indent(true);
        self.to_xml_element().write_with_config(writer, config)?;
        Ok(())
    }

    /// The document as a string.
    pub fn to_xml_string(&self) -> BuilderResult<String> {
        let mut out = Vec::new();
        self.write_xml(&mut out)?;
        String::from_utf8(out)
            .map_err(|e| BuilderError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Save the document to a file.
    pub fn save_to_xml(&self, path: &Path) -> BuilderResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_xml(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), routines = self.routines.len(), "saved experiment");
        Ok(())
    }

    /// Load an experiment from a file, using the default configuration and catalog.
    pub fn load_from_xml(path: &Path) -> BuilderResult<Self> {
        let mut experiment = Experiment::new();
        experiment.read_xml_file(path)?;
        Ok(experiment)
    }

    /// Parse an experiment from a string, using the default configuration and catalog.
    pub fn from_xml_str(text: &str) -> BuilderResult<Self> {
        let mut experiment = Experiment::new();
        experiment.read_xml(&Element::parse(text.as_bytes())?)?;
        Ok(experiment)
    }

    /// Replace this experiment's content with the document at `path`.
    ///
    /// The configuration and catalog of `self` are kept.
    pub fn read_xml_file(&mut self, path: &Path) -> BuilderResult<()> {
        let file = File::open(path)?;
        let root = Element::parse(BufReader::new(file))?;
        self.read_xml(&root)?;
        info!(path = %path.display(), routines = self.routines.len(), "loaded experiment");
        Ok(())
    }

    /// Replace this experiment's content with a parsed document tree.
    ///
    /// On error the experiment is left unchanged.
    pub fn read_xml(&mut self, root: &Element) -> BuilderResult<()> {
        if root.name != ROOT_TAG {
            return Err(BuilderError::MalformedDocument(format!(
                "<{ROOT_TAG}> root element (found <{}>)",
                root.name
            )));
        }
        let version = required_attr(root, "version")?.to_string();
        if let Some(format) = root.attributes.get("formatVersion") {
            match format.parse::<u32>() {
                Ok(v) if v > FORMAT_VERSION => warn!(
                    document = v,
                    supported = FORMAT_VERSION,
                    "document format is newer than this builder, loading anyway"
                ),
                Ok(_) => {}
                Err(_) => warn!(format_version = %format, "unreadable document format version"),
            }
        }

        let mut loaded =
            Experiment::with_config(&BuilderConfig::default()).with_catalog(self.catalog.clone());
        loaded.version = version;
        loaded.codegen = self.codegen.clone();
        loaded.encoding = self.encoding.clone();

        read_params(required_child(root, SETTINGS_TAG)?, loaded.settings.params_mut())?;
        let exp_name = loaded.settings.exp_name();
        if !exp_name.is_empty() {
            loaded.name = Some(exp_name);
        }

        for routine_node in child_elements(required_child(root, ROUTINES_TAG)?) {
            let name = required_attr(routine_node, "name")?;
            let mut routine = Routine::new(name);
            for component_node in child_elements(routine_node) {
                let component_name = required_attr(component_node, "name")?;
                let mut component = loaded.catalog.create(&component_node.name, component_name)?;
                read_params(component_node, component.params_mut())?;
                routine.add_component(component);
            }
            loaded.add_routine(name, Some(routine));
        }

        for node in child_elements(required_child(root, FLOW_TAG)?) {
            let name = required_attr(node, "name")?;
            match node.name.as_str() {
                ROUTINE_TAG => {
                    if !loaded.routines.contains_key(name) {
                        return Err(BuilderError::MalformedDocument(format!(
                            "routine '{name}' referenced by the flow"
                        )));
                    }
                    loaded.flow.push_routine(name);
                }
                TERMINATOR_TAG => loaded.flow.push_loop_terminator(name)?,
                tag => {
                    let mut handler = Loop::from_type_tag(tag, name)?;
                    read_params(node, handler.params_mut())?;
                    handler.set_name(name);
                    loaded.flow.push_loop_initiator(handler);
                    loaded.require_libs(&[LOOP_LIBRARY]);
                }
            }
        }
        let depth = loaded.flow.validate()?;
        debug!(
            routines = loaded.routines.len(),
            flow_elements = loaded.flow.len(),
            depth,
            "read experiment document"
        );

        *self = loaded;
        Ok(())
    }
}
