//! Hashing primitives for qt.
//!
//! Every derived on-disk location (object records, dependency links, meta
//! records, the basename index) and every content digest goes through a
//! domain-separated BLAKE3 [`ContentHasher`], so two domains never collide
//! even when hashing identical bytes.

pub mod hasher;

pub use hasher::ContentHasher;
