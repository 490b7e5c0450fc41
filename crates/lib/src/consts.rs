//! Names and sizes shared across the crate.

/// Application name, used for platform directories.
pub const APP_NAME: &str = "zbuild";

/// Default project configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "build.lua";

/// Default pinned toolchain file, relative to the workspace root.
pub const DEFAULT_TOOLCHAIN_FILE: &str = "rust-toolchain.toml";

/// Number of hex characters of a SHA-256 kept in store entry names.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Environment variable overriding the store location.
pub const STORE_ENV: &str = "ZBUILD_STORE";

/// Environment variable overriding the data directory (build records).
pub const DATA_ENV: &str = "ZBUILD_DATA";

/// Default number of stages run concurrently within a wave.
pub const DEFAULT_PARALLELISM: usize = 4;

/// `SOURCE_DATE_EPOCH` handed to every build command (1980-01-01, the ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";
