//! Object model and parsing for qt.
//!
//! Objects are named units of text extracted from *object files*: macros
//! (`m4_`), includes (`i4_`) and language codes (`l4_`). This crate owns
//! their data types, the object-file grammar, lint rules, and the low-level
//! text tools shared with the resolver: the reference tokenizer, the call
//! argument parser and the render algorithms.
//!
//! # Modules
//!
//! - [`token`] -- Split text into literals and `<prefix>4_<name>` references
//! - [`args`] -- Parse `( … )` call arguments with nesting and quoting
//! - [`render`] -- Language selection and escaping algorithms
//! - [`macros`], [`include`], [`lgcode`] -- The three object variants
//! - [`object`] -- The [`Object`] envelope and its on-disk record
//! - [`objfile`] -- Object-file parser and lint
//!
//! # Design Rules
//!
//! - The variant set is closed: [`ObjectBody`] is matched exhaustively.
//! - Parse problems are [`Diagnostics`](qt_types::Diagnostics), never panics.
//! - Blocks in one file parse independently; one bad block hides nothing.

pub mod args;
pub mod error;
pub mod include;
pub mod lgcode;
pub mod macros;
pub mod object;
pub mod objfile;
pub mod render;
pub mod token;

pub use args::{build_args, clean_arg};
pub use error::{ObjectError, ObjectResult};
pub use include::Include;
pub use lgcode::{Lgcode, LgNature};
pub use macros::{Macro, Param};
pub use object::{Object, ObjectBody};
pub use objfile::{FileKind, ObjectFile};
pub use render::{Language, LgModifier, RenderAlgo};
pub use token::{split, Split, Token};
