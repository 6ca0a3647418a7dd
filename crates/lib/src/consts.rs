//! Constants shared across the crate.

pub const APP_NAME: &str = "mbs";

/// Project model file, stored at the project root.
pub const PROJECT_FILE_NAME: &str = ".mbsproject.json";

/// Per-project data directory holding build state and the build lock.
pub const PROJECT_DATA_DIR: &str = ".mbs";

/// Build state directory inside [`PROJECT_DATA_DIR`].
pub const STATE_DIR: &str = "state";

/// Format version written into project files.
///
/// A file with a different major version is refused; a different minor
/// version goes through the upgrade hook before use.
pub const PROJECT_FORMAT_VERSION: &str = "4.0.0";

/// Format version of persisted build state.
pub const BUILD_STATE_VERSION: u32 = 1;

/// Requested parallelism meaning "pick from the host's core count".
pub const OPTIMAL_PARALLELISM: i32 = -1;

/// Placeholder in output name patterns replaced by the input file stem.
pub const WILDCARD: char = '%';

pub const DEFAULT_COMMAND_LINE_PATTERN: &str = "${COMMAND} ${FLAGS} ${OUTPUT_FLAG} ${OUTPUT} ${INPUTS}";

/// Separator for list-valued manifest attributes such as `unusedChildren`.
pub const LIST_SEPARATOR: char = ';';

/// Separator for extension lists (`sources`, `outputs`).
pub const EXTENSION_SEPARATOR: char = ',';
