//! Runtime configuration.
//!
//! A single immutable [`Config`] value is threaded through every endpoint and
//! pub/sub call rather than read from an ambient global, so a process can
//! address more than one IPC root (for example, a test harness pointed at a
//! temp directory alongside the system default).

use std::path::{Path, PathBuf};

/// Default IPC root, matching the historic `toolbox` install location.
const DEFAULT_IPC_ROOT: &str = "/var/lib/toolbox/ipc";

/// Environment variable that overrides the IPC root.
const IPC_ROOT_ENV: &str = "TOOLBOX_IPC_ROOT";

/// Protocol version this build of the crate speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Resolved configuration for the endpoint and pub/sub layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root directory under which endpoint directories live.
    pub ipc_root: PathBuf,
    /// Root directory under which pub/sub topic directories live.
    pub pubsub_root: PathBuf,
    /// Protocol version stamped on every envelope this process creates, and
    /// checked on every envelope it validates.
    pub protocol_version: u32,
}

impl Config {
    /// Build a config rooted at an arbitrary directory, deriving
    /// `pubsub_root` as `<root>/pubsub`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let ipc_root = root.as_ref().to_path_buf();
        let pubsub_root = ipc_root.join("pubsub");
        Self {
            ipc_root,
            pubsub_root,
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Resolve configuration from the environment, falling back to the
    /// compiled-in default when `TOOLBOX_IPC_ROOT` is unset.
    pub fn from_env() -> Self {
        match std::env::var(IPC_ROOT_ENV) {
            Ok(root) if !root.is_empty() => Self::with_root(root),
            _ => Self::default(),
        }
    }

    /// Directory that holds named endpoints.
    ///
    /// Endpoint directories live directly under `ipc_root` (alongside
    /// `priv/` and `pubsub/`), since the filesystem layout is this
    /// substrate's wire format — processes rendezvous by path, so an
    /// injected path segment here would break interop with anything
    /// else addressing endpoints by the documented layout.
    pub fn endpoints_dir(&self) -> PathBuf {
        self.ipc_root.clone()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_root(DEFAULT_IPC_ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ipc_root, PathBuf::from(DEFAULT_IPC_ROOT));
        assert_eq!(
            config.pubsub_root,
            PathBuf::from(DEFAULT_IPC_ROOT).join("pubsub")
        );
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_with_root_derives_pubsub_root() {
        let config = Config::with_root("/tmp/example-root");
        assert_eq!(config.pubsub_root, PathBuf::from("/tmp/example-root/pubsub"));
    }

    #[test]
    #[serial]
    fn test_from_env_override() {
        std::env::set_var(IPC_ROOT_ENV, "/tmp/env-override-root");
        let config = Config::from_env();
        assert_eq!(config.ipc_root, PathBuf::from("/tmp/env-override-root"));
        std::env::remove_var(IPC_ROOT_ENV);
    }

    #[test]
    #[serial]
    fn test_from_env_falls_back_to_default() {
        std::env::remove_var(IPC_ROOT_ENV);
        let config = Config::from_env();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_endpoints_dir_is_ipc_root() {
        let config = Config::with_root("/tmp/example-root");
        assert_eq!(config.endpoints_dir(), PathBuf::from("/tmp/example-root"));
    }
}
