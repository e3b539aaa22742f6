//! Core types for bubblebox.

mod access;

pub use access::*;
