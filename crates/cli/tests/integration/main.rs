//! End-to-end tests running the zbuild binary against a scratch workspace.
//!
//! Build commands are shell snippets standing in for cargo and mdbook.

#![cfg(unix)]

mod build_tests;
mod common;
mod gc_tests;
mod sources_tests;
