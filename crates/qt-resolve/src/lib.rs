//! Recursive reference resolver for qt.
//!
//! [`ResolveContext::resolve`] rewrites a body by expanding the references
//! selected by a [`Mode`]:
//!
//! - `r4_key` -- registry value, `_` read as `-`; a trailing `_` asks for the
//!   web base URL in front of relative values
//! - `t4_name` -- caller-supplied text, resolved again
//! - `i4_name` -- include content, resolved again with the same mode
//! - `l4_[mod_]name` -- one language body, aliases followed; resolved again
//!   for `r`/`l` only, with the modifier carried forward
//! - `m4_name(args)` -- macro body with bound arguments, resolved again
//!   together with the rest of the following literal; includes inside it
//!   stay literal
//!
//! Unknown objects pass through literally. Malformed calls, bad modifiers,
//! alias cycles and self-recursion abort the call with a [`ResolveError`].
//!
//! # Design Rules
//!
//! - The object store is read, never written.
//! - The [`ObjectCache`] is the only mutable state and is owned by the
//!   caller; each name is fetched at most once per cache.

pub mod cache;
pub mod error;
pub mod mode;
pub mod resolver;

pub use cache::ObjectCache;
pub use error::{ResolveError, ResolveResult};
pub use mode::Mode;
pub use resolver::{ResolveContext, MAX_DEPTH};
