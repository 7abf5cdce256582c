//! # Trialflow Core Library
//!
//! This crate is the model and script generator behind a graphical experiment
//! builder. An experiment is described as routines (timed sequences of
//! components such as stimuli and responses) arranged on a flow, with loops
//! bracketing parts of the flow. From that description the crate generates a
//! complete runnable experiment script, and it saves and loads the description
//! as an XML document.
//!
//! ## Crate Structure
//!
//! - **`value`** / **`param`**: Literal values and typed params with their rendering rules.
//! - **`writer`**: `IndentedWriter`, the buffer every code fragment is written through.
//! - **`component`**: The `Component` trait and the `ComponentCatalog` used by the loader.
//! - **`components`**: Components shipped with the core (`CodeComponent`).
//! - **`routine`**: `Routine`, its per-frame timing loop and duration computation.
//! - **`loops`**: `TrialHandler` and `StairHandler`, wrapped in the `Loop` enum.
//! - **`flow`**: `Flow`, the flat list of routines and loop markers, and its two-pass writer.
//! - **`settings`**: Experiment-wide settings written before and after the flow.
//! - **`experiment`**: `Experiment`, the aggregate that owns everything and writes the script.
//! - **`document`**: XML save/load for experiments.
//! - **`config`**: Figment-based configuration (`trialflow.toml` + `TRIALFLOW_` env).
//! - **`logging`**: Tracing subscriber setup.
//! - **`error`**: `BuilderError`, the crate-wide error type.
//!
//! ## Example
//!
//! ```
//! use trialflow::{Experiment, Routine, TrialHandler};
//!
//! let mut exp = Experiment::new();
//! exp.set_exp_name("demo");
//! exp.add_routine("trial", Some(Routine::new("trial")));
//! exp.flow_mut().add_routine("trial", 0);
//! exp.add_loop(TrialHandler::new("trials", "random", 5).into(), 0, 1);
//!
//! let script = exp.write_script()?;
//! assert!(script.contains("for thisTrial in trials:"));
//! # Ok::<(), trialflow::BuilderError>(())
//! ```

pub mod component;
pub mod components;
pub mod config;
pub mod document;
pub mod error;
pub mod experiment;
pub mod flow;
pub mod logging;
pub mod loops;
pub mod param;
pub mod routine;
pub mod settings;
pub mod value;
pub mod writer;

pub use component::{Component, ComponentCatalog};
pub use config::BuilderConfig;
pub use error::{BuilderError, BuilderResult};
pub use experiment::Experiment;
pub use flow::{Flow, FlowElement};
pub use loops::{Loop, StairHandler, TrialHandler};
pub use param::{Param, ParamSet, UpdatePolicy, ValueKind};
pub use routine::Routine;
pub use settings::Settings;
pub use value::Value;
pub use writer::IndentedWriter;
