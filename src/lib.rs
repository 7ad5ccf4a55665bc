//! A local-host, signed, filesystem-rendezvous IPC substrate.
//!
//! Named endpoints exchange cryptographically signed messages through a
//! shared directory tree: point-to-point delivery via per-endpoint queues,
//! and topic fan-out via a symlink-based subscription graph. Endpoints
//! persist across process restarts and rendezvous purely through the
//! filesystem, so any number of unrelated processes on the same host can
//! address each other by name without a broker.
//!
//! Authenticity, not confidentiality, is the property this crate provides:
//! every envelope is signed by its sender and the signer's identity is
//! recoverable on verification, but payloads are not encrypted.
//!
//! ```no_run
//! use toolbox_ipc::{config::Config, endpoint, signer::GpgSigner};
//!
//! let config = Config::default();
//! let signer = GpgSigner::new()?;
//!
//! endpoint::open(Some("svc/a"), &config)?;
//! endpoint::open(Some("svc/b"), &config)?;
//! endpoint::send("svc/a", "svc/b", b"hello", None, &config, &signer)?;
//! # Ok::<(), toolbox_ipc::error::IpcError>(())
//! ```

pub mod codec;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod logger;
pub mod pubsub;
pub mod queue;
pub mod signer;

pub use config::Config;
pub use error::{IpcError, Result};
pub use logger::{Logger, TracingLogger};
pub use queue::{FsQueue, Queue, Timeout};
pub use signer::{GpgSigner, Signer, SignerInfo};
