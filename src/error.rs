//! Custom error types for the builder core.
//!
//! This module defines the primary error type, `BuilderError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur while generating scripts or moving experiments to and
//! from disk.
//!
//! ## Error Hierarchy
//!
//! - **`UnsupportedParamKind`**: A param declares a value kind with no rendering rule.
//!   This is a programming error in the param catalog and aborts generation.
//! - **`MalformedFlowStructure`**: Loop markers in the flow do not form a valid stack
//!   (terminator without initiator, interleaved loops, unterminated loops) or a flow
//!   element references something that does not exist.
//! - **`DuplicateName`** / **`InvalidName`**: Raised by the checked naming helpers.
//!   The plain `Experiment::add_routine` does not enforce uniqueness.
//! - **`CodeEvaluation`**: A component's time interval could not be evaluated to a
//!   number while computing a routine's duration.
//! - **`InvalidParam`**: A param stored as text (a hand-edited condition list, say)
//!   does not parse as the structured value generation needs.
//! - **`MalformedDocument`** / **`UnknownComponentType`**: The experiment document is
//!   missing a required node or attribute, or names a component type the catalog
//!   cannot construct.
//! - **`Io`**, **`XmlParse`**, **`XmlWrite`**, **`Config`**: Wrapped errors from the
//!   underlying libraries.
//!
//! None of these are recovered locally: every variant propagates to the top-level
//! generation or load call so the builder UI can report it for correction.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type BuilderResult<T> = std::result::Result<T, BuilderError>;

/// Primary error type for experiment generation and persistence.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// A param's declared kind has no rendering rule.
    #[error("Cannot render a param of kind '{kind}'")]
    UnsupportedParamKind {
        /// The unrecognised kind tag
        kind: String,
    },

    /// Loop markers or flow references are inconsistent.
    #[error("Malformed flow at '{loop_name}': {reason}")]
    MalformedFlowStructure {
        /// Loop (or routine) the problem was detected at
        loop_name: String,
        /// What went wrong
        reason: String,
    },

    /// The name is already used by another routine component or loop.
    #[error("Name '{name}' is already used by a {owner}")]
    DuplicateName {
        /// The rejected name
        name: String,
        /// Type tag of the object already using it
        owner: String,
    },

    /// The name is not a valid identifier in the generated script.
    #[error("Name '{0}' is not a valid identifier")]
    InvalidName(String),

    /// A component's time interval did not evaluate to numbers.
    #[error("Cannot evaluate times of component '{component}' in routine '{routine}': {reason}")]
    CodeEvaluation {
        /// Routine owning the component
        routine: String,
        /// Offending component
        component: String,
        /// Evaluation failure details
        reason: String,
    },

    /// A param holds text that cannot be read as the value it must contain.
    #[error("Invalid value for param '{param}' of '{owner}': {reason}")]
    InvalidParam {
        /// Component or loop owning the param
        owner: String,
        /// Param name
        param: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The experiment document lacks an expected node or attribute.
    #[error("Malformed experiment document: missing {0}")]
    MalformedDocument(String),

    /// The document names a component type the catalog cannot build.
    #[error("Unknown component type '{0}'")]
    UnknownComponentType(String),

    /// I/O error while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not well-formed XML.
    #[error("XML parse error: {0}")]
    XmlParse(#[from] xmltree::ParseError),

    /// The document could not be written.
    #[error("XML write error: {0}")]
    XmlWrite(#[from] xmltree::Error),

    /// Configuration file parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration values parsed but are not acceptable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl BuilderError {
    /// Shorthand for a flow structure error.
    pub fn malformed_flow(loop_name: impl Into<String>, reason: impl Into<String>) -> Self {
        BuilderError::MalformedFlowStructure {
            loop_name: loop_name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_flow_names_the_loop() {
        let err = BuilderError::malformed_flow("trials", "terminator without initiator");
        let msg = err.to_string();
        assert!(msg.contains("'trials'"));
        assert!(msg.contains("terminator without initiator"));
    }

    #[test]
    fn code_evaluation_names_component_and_routine() {
        let err = BuilderError::CodeEvaluation {
            routine: "trial".into(),
            component: "beep".into(),
            reason: "not a number".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'beep'"));
        assert!(msg.contains("'trial'"));
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn open_missing() -> BuilderResult<()> {
            std::fs::read_to_string("/definitely/not/here.xml")?;
            Ok(())
        }
        match open_missing() {
            Err(BuilderError::Io(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
