//! zbuild-lib: build glue for the Crosslink workspace
//!
//! The pieces, bottom up:
//! - `classify` / `select`: decide which paths form a build input and copy them into the store
//! - `regression`: compare the legacy and fileset classifiers on the live tree
//! - `workspace`: resolve the toolchain, build the dependency artifact set, its consumers and the book
//! - `execute`: run the stage DAG with bounded parallelism
//! - `link`: assemble the named output tree
//! - `records` / `gc`: keep what the last builds used, sweep the rest

pub mod classify;
pub mod consts;
pub mod execute;
pub mod gc;
pub mod link;
pub mod pathset;
pub mod platform;
pub mod project;
pub mod records;
pub mod regression;
pub mod select;
pub mod store;
pub mod store_lock;
pub mod toolchain;
pub mod util;
pub mod workspace;
