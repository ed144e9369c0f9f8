extern crate vergen;

use vergen::EmitBuilder;

pub fn main() {
  // NOTE: This will output only a build timestamp and long SHA from git.
  EmitBuilder::builder()
    .build_timestamp()
    .git_sha(false)
    .emit()
    .unwrap();
}
