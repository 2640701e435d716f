//! Names and fixed paths shared across the engine.

/// Default build description file name, looked up in the current directory.
pub const BAKEFILE_NAME: &str = "Bakefile.toml";

/// Default build artifact root, relative to the project root.
pub const DEFAULT_OUTPUT_DIR: &str = "build";

/// Object files live under `<output-dir>/obj`.
pub const OBJ_DIR: &str = "obj";

/// Executables live under `<output-dir>/bin`.
pub const BIN_DIR: &str = "bin";

/// Static libraries live under `<output-dir>/lib`.
pub const LIB_DIR: &str = "lib";

/// Per-rule signature cache, relative to the output dir.
pub const SIGNATURES_FILE: &str = ".signatures";

/// Version of the signature cache format.
pub const SIGNATURES_VERSION: u32 = 1;
