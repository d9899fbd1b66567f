//! # Runlet Utilities
//!
//! Narrow helper contracts consumed by the engine core:
//!
//! - [`variables`]: the `NAME=VALUE` exchange-file format and `$VAR`
//!   placeholder substitution across environment maps
//! - [`expressions`]: the `${{ ... }}` expression language used by step
//!   conditions and declared inputs
//! - [`text_processing`]: ANSI escape stripping for subprocess output lines

pub mod expressions;
pub mod text_processing;
pub mod variables;

pub use expressions::{evaluate_expression, interpolate, is_truthy};
pub use text_processing::strip_ansi_codes;
pub use variables::{parse_variable_file, replace_variable_placeholders};
