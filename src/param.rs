//! Typed component params and their rendering as source literals.
//!
//! Every component, loop handler and the settings pseudo-component describe
//! their configuration as a [`ParamSet`]. A [`Param`] pairs a [`Value`] with
//! the [`ValueKind`] that decides how it is substituted into generated code:
//!
//! ```
//! use trialflow::param::{Param, ValueKind};
//! use trialflow::value::Value;
//!
//! let size = Param::new(Value::List(vec![3.into(), 4.into()]), ValueKind::Numeric);
//! assert_eq!(size.render().unwrap(), "asarray([3, 4])");
//!
//! let text = Param::new("it's", ValueKind::Str);
//! assert_eq!(text.render().unwrap(), "\"it's\"");
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BuilderError, BuilderResult};
use crate::value::{float_literal, Value};

/// How a param's value is substituted into generated code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Number or numeric array
    Numeric,
    /// Quoted string (or any structured literal)
    Str,
    /// Raw source fragment
    Code,
    /// Boolean
    Bool,
    /// A kind this build has no rendering rule for (only produced by documents)
    Unsupported(String),
}

impl ValueKind {
    /// Tag used in experiment documents.
    pub fn tag(&self) -> &str {
        match self {
            ValueKind::Numeric => "num",
            ValueKind::Str => "str",
            ValueKind::Code => "code",
            ValueKind::Bool => "bool",
            ValueKind::Unsupported(tag) => tag,
        }
    }

    /// Inverse of [`ValueKind::tag`]. Unknown tags are preserved.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "num" => ValueKind::Numeric,
            "str" => ValueKind::Str,
            "code" => ValueKind::Code,
            "bool" => ValueKind::Bool,
            other => ValueKind::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How often a param is re-applied while the script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpdatePolicy {
    /// Set once
    #[default]
    Constant,
    /// Set at the start of every routine repeat
    EveryRepeat,
    /// Set on every frame
    EveryFrame,
}

impl UpdatePolicy {
    /// Tag used in experiment documents.
    pub fn tag(self) -> &'static str {
        match self {
            UpdatePolicy::Constant => "constant",
            UpdatePolicy::EveryRepeat => "set every repeat",
            UpdatePolicy::EveryFrame => "set every frame",
        }
    }

    /// Inverse of [`UpdatePolicy::tag`]. `None` (and an empty string) mean constant.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "constant" | "None" | "" => Some(UpdatePolicy::Constant),
            "set every repeat" => Some(UpdatePolicy::EveryRepeat),
            "set every frame" => Some(UpdatePolicy::EveryFrame),
            _ => None,
        }
    }
}

/// A typed, named configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Current value
    pub value: Value,
    /// Declared kind, decides rendering
    pub kind: ValueKind,
    /// Allowed values, empty for unrestricted
    pub allowed_values: Vec<Value>,
    /// Other kinds a document may store the value as, empty for unrestricted
    pub allowed_kinds: Vec<ValueKind>,
    /// Help text shown in the editor
    pub hint: String,
    /// Update frequency
    pub updates: UpdatePolicy,
    /// Update frequencies the editor offers
    pub allowed_updates: Vec<UpdatePolicy>,
}

impl Param {
    /// Create a param with a value and kind and no metadata.
    pub fn new(value: impl Into<Value>, kind: ValueKind) -> Self {
        Self {
            value: value.into(),
            kind,
            allowed_values: Vec::new(),
            allowed_kinds: Vec::new(),
            hint: String::new(),
            updates: UpdatePolicy::Constant,
            allowed_updates: Vec::new(),
        }
    }

    /// Attach help text.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    /// Restrict to a set of values.
    pub fn with_allowed_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the kinds the value may be stored as.
    pub fn with_allowed_kinds(mut self, kinds: &[ValueKind]) -> Self {
        self.allowed_kinds = kinds.to_vec();
        self
    }

    /// Whether the value may be stored as `kind`.
    pub fn accepts_kind(&self, kind: &ValueKind) -> bool {
        self.allowed_kinds.is_empty() || *kind == self.kind || self.allowed_kinds.contains(kind)
    }

    /// Whether `updates` is one of the offered update policies.
    pub fn accepts_updates(&self, updates: UpdatePolicy) -> bool {
        self.allowed_updates.is_empty() || self.allowed_updates.contains(&updates)
    }

    /// Set the update policy and the policies offered in the editor.
    pub fn with_updates(mut self, updates: UpdatePolicy, allowed: &[UpdatePolicy]) -> Self {
        self.updates = updates;
        self.allowed_updates = allowed.to_vec();
        self
    }

    /// Render as source text according to the declared kind.
    pub fn render(&self) -> BuilderResult<String> {
        match &self.kind {
            ValueKind::Numeric => Ok(match self.value.as_f64() {
                Some(f) if self.value.is_scalar() => float_literal(f),
                _ => match &self.value {
                    Value::Str(raw) => format!("asarray({raw})"),
                    other => format!("asarray({})", other.to_literal()),
                },
            }),
            ValueKind::Str => Ok(self.value.to_literal()),
            ValueKind::Code => Ok(self.raw_text()),
            ValueKind::Bool => Ok(match &self.value {
                Value::Bool(true) => "True".to_string(),
                Value::Bool(false) => "False".to_string(),
                other => Self::plain(other),
            }),
            ValueKind::Unsupported(kind) => Err(BuilderError::UnsupportedParamKind {
                kind: kind.clone(),
            }),
        }
    }

    /// The value as written by the user: strings verbatim, anything else as a literal.
    pub fn raw_text(&self) -> String {
        Self::plain(&self.value)
    }

    fn plain(value: &Value) -> String {
        match value {
            Value::Str(s) => s.clone(),
            other => other.to_literal(),
        }
    }
}

/// Ordered name→param mapping owned by one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    params: IndexMap<String, Param>,
}

impl ParamSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a param, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, param: Param) -> Option<Param> {
        self.params.insert(name.into(), param)
    }

    /// Look up a param.
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.get(name)
    }

    /// Look up a param mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.params.get_mut(name)
    }

    /// Render a param, failing with a flow-independent message when it is absent.
    pub fn render(&self, name: &str) -> BuilderResult<String> {
        match self.params.get(name) {
            Some(param) => param.render(),
            None => Err(BuilderError::MalformedDocument(format!("param '{name}'"))),
        }
    }

    /// Raw text of a param, or empty when absent.
    pub fn text(&self, name: &str) -> String {
        self.params
            .get(name)
            .map(Param::raw_text)
            .unwrap_or_default()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Param)> {
        self.params.iter()
    }

    /// Param names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Number of params.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
