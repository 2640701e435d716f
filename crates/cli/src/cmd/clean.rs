//! Implementation of `bake --clean`.

use anyhow::Result;

use bake_lib::driver::{self, Options};

use crate::output::{print_info, print_success};

pub fn cmd_clean(options: &Options) -> Result<u8> {
  let path = options.root.join(&options.output_dir);

  if driver::clean(options)? {
    print_success(&format!("Removed {}", path.display()));
  } else {
    print_info(&format!("Nothing to clean at {}", path.display()));
  }

  Ok(0)
}
