//! Lua runtime for `build.lua` and the `zb` global.
//!
//! - `zb.dir` - Directory of the config file
//! - `zb.platform` - Platform triple (e.g., "aarch64-darwin")
//! - `zb.os` - Operating system name (e.g., "darwin", "linux", "windows")
//! - `zb.arch` - CPU architecture (e.g., "x86_64", "aarch64")
//! - `zb.env(name)` - Host environment variable, or nil

use std::path::Path;

use mlua::prelude::*;

use crate::platform::Platform;

/// Create a Lua runtime with the `zb` global registered.
pub fn create_runtime(config_dir: &Path) -> LuaResult<Lua> {
  let lua = Lua::new();
  let package = lua.globals().get::<LuaTable>("package")?;
  let package_path = package.get::<String>("path")?;
  let dir = config_dir.to_string_lossy();
  package.set("path", format!("{dir}/lua/?.lua;{dir}/lua/?/init.lua;{package_path}"))?;

  register_globals(&lua, config_dir)?;
  Ok(lua)
}

fn register_globals(lua: &Lua, config_dir: &Path) -> LuaResult<()> {
  let zb = lua.create_table()?;

  let platform = Platform::current().ok_or_else(|| LuaError::external("unsupported platform"))?;
  zb.set("platform", platform.triple())?;
  zb.set("os", platform.os.as_str())?;
  zb.set("arch", platform.arch.as_str())?;
  zb.set("dir", config_dir.to_string_lossy().into_owned())?;

  let env = lua.create_function(|_, name: String| Ok(std::env::var(name).ok()))?;
  zb.set("env", env)?;

  lua.globals().set("zb", zb)?;
  Ok(())
}

/// Load and execute a Lua file, returning its value.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let content = std::fs::read_to_string(path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", path.display(), e)))?;

  lua
    .load(&content)
    .set_name(format!("@{}", path.display()))
    .eval::<LuaValue>()
}
