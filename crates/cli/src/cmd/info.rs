use anyhow::Result;
use serde::Serialize;

use zbuild_lib::platform::paths::{records_dir, store_dir};
use zbuild_lib::platform::{Platform, platform_triple};

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Debug, Serialize)]
struct Info {
  version: &'static str,
  platform: Option<String>,
  host_triple: Option<String>,
  store: std::path::PathBuf,
  records: std::path::PathBuf,
}

pub fn cmd_info(output: OutputFormat) -> Result<()> {
  let info = Info {
    version: env!("CARGO_PKG_VERSION"),
    platform: platform_triple(),
    host_triple: Platform::current().map(|p| p.rust_triple()),
    store: store_dir(),
    records: records_dir(),
  };

  if output.is_json() {
    return print_json(&info);
  }

  println!("zbuild {}", info.version);
  match &info.platform {
    Some(triple) => print_stat("Platform", triple),
    None => print_stat("Platform", "unsupported"),
  }
  if let Some(triple) = &info.host_triple {
    print_stat("Host", triple);
  }
  print_stat("Store", &info.store.display().to_string());
  print_stat("Records", &info.records.display().to_string());
  Ok(())
}
