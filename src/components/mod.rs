//! Components shipped with the builder core.
//!
//! The full stimulus/response catalog lives in the application; only the
//! generic code component is provided here.

pub mod code;

pub use code::CodeComponent;
