//! System-wide constants and registry defaults.

/// Default token endpoint of the public registry.
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";

/// Service name sent to the token endpoint.
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

/// Default registry base URL (the `/v2/` API lives under it).
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";

/// Namespace prepended to single-component repository names.
pub const DEFAULT_NAMESPACE: &str = "library";

/// Tag used when the image reference names none.
pub const DEFAULT_TAG: &str = "latest";

/// Media type requested from, and required of, the manifest endpoint.
pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Media type of a multi-platform manifest list.
pub const MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Manifest schema version this launcher understands.
pub const MANIFEST_SCHEMA_VERSION: u32 = 2;

/// Maximum number of layers in an image.
pub const MAX_IMAGE_LAYERS: usize = 128;

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Prefix of every ephemeral root directory name.
pub const ROOT_DIR_PREFIX: &str = "burrow-";

/// Prefix of the transient archive file a layer is streamed into.
pub const LAYER_ARCHIVE_PREFIX: &str = ".burrow-layer-";

/// Default timeout for a single registry request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default deadline for the whole pull phase, in seconds.
pub const DEFAULT_PULL_TIMEOUT_SECS: u64 = 1800;

/// Exit code for failures that happen before the command is started.
pub const LAUNCHER_FAILURE_EXIT_CODE: i32 = 1;

/// Exit code when the command cannot be resolved or started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Offset added to a signal number when the command is killed by it.
pub const SIGNAL_EXIT_CODE_BASE: i32 = 128;

/// Application name used in log output.
pub const APP_NAME: &str = "burrow";
