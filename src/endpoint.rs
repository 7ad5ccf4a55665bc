//! Named, persistent mailboxes.
//!
//! An endpoint is a directory holding a queue and a set of outgoing
//! subscription symlinks. Creation is idempotent on an existing, properly
//! shaped directory; anonymous endpoints get a unique name under the
//! reserved `priv/` prefix rather than requiring the caller to pick one.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::envelope;
use crate::error::{IpcError, Result};
use crate::logger::Logger;
use crate::queue::{FsQueue, Queue, Timeout};
use crate::signer::Signer;

const QUEUE_DIR: &str = "queue";
const SUBSCRIPTIONS_DIR: &str = "subscriptions";
const OWNER_FILE: &str = "owner";
const PRIV_PREFIX: &str = "priv";

fn endpoint_dir(config: &Config, name: &str) -> PathBuf {
    config.endpoints_dir().join(name)
}

fn queue_for(config: &Config, name: &str) -> FsQueue {
    FsQueue::new(endpoint_dir(config, name).join(QUEUE_DIR))
}

fn looks_like_endpoint(dir: &Path) -> bool {
    dir.join(QUEUE_DIR).is_dir() && dir.join(SUBSCRIPTIONS_DIR).is_dir()
}

#[cfg(unix)]
fn apply_group_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // group rwx + setgid, owner rwx, others nothing.
    let mode = 0o2770;
    fs::set_permissions(dir, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_group_permissions(_dir: &Path) -> Result<()> {
    Ok(())
}

fn synthesize_anonymous_name() -> String {
    let user = whoami::username();
    let prog = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string());
    let pid = std::process::id();
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{PRIV_PREFIX}/{user}.{prog}.{pid}.{epoch}.{nonce}")
}

fn create_endpoint_dir(config: &Config, name: &str) -> Result<()> {
    let dir = endpoint_dir(config, name);
    let result = (|| -> Result<()> {
        fs::create_dir_all(&dir)?;
        apply_group_permissions(&dir)?;
        fs::create_dir_all(dir.join(SUBSCRIPTIONS_DIR))?;
        fs::write(dir.join(OWNER_FILE), format!("{}\n", whoami::username()))?;
        queue_for(config, name).init()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_dir_all(&dir);
    }
    result
}

/// Open (creating if absent) a named endpoint, or synthesize a unique
/// anonymous one under `priv/` when `name` is `None`. Returns the
/// endpoint's name.
pub fn open(name: Option<&str>, config: &Config) -> Result<String> {
    let name = match name {
        Some(name) => name.to_string(),
        None => synthesize_anonymous_name(),
    };

    let dir = endpoint_dir(config, &name);
    if dir.exists() {
        if looks_like_endpoint(&dir) {
            return Ok(name);
        }
        // A directory exists but was not produced by a previous `open`;
        // treat it as a fresh creation attempt rather than adopting it.
    }

    create_endpoint_dir(config, &name)?;
    Ok(name)
}

/// Destroy the endpoint's queue, tear down its subscriptions, and remove
/// its directory.
///
/// Unsubscribe failures are logged and do not abort `close`; a
/// queue-destroy failure aborts immediately and propagates.
pub fn close(name: &str, config: &Config, logger: &dyn Logger) -> Result<()> {
    let dir = endpoint_dir(config, name);

    queue_for(config, name).destroy()?;

    let subscriptions_dir = dir.join(SUBSCRIPTIONS_DIR);
    let mut topics = Vec::new();
    collect_topic_links(&subscriptions_dir, &subscriptions_dir, &mut topics);

    let flat = name.replace('/', "_");
    for topic in topics {
        let subscriber_link = config.pubsub_root.join(&topic).join(&flat);
        if let Err(e) = fs::remove_file(&subscriber_link) {
            if e.kind() != std::io::ErrorKind::NotFound {
                logger.log_warn(&format!(
                    "close({name}): failed to remove subscriber link for topic {topic}: {e}"
                ));
            }
        }
    }

    fs::remove_dir_all(&dir)?;
    Ok(())
}

/// Recursively walk `dir` (rooted at `base`) collecting the slash-joined
/// path of every symlink found, relative to `base`. Topics may contain
/// "/" (§6.1), so a subscription to `t/x` is a symlink nested two levels
/// under `subscriptions/`, not a single path component.
fn collect_topic_links(base: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_symlink() {
            if let Ok(relative) = path.strip_prefix(base) {
                if let Some(topic) = relative.to_str() {
                    out.push(topic.to_string());
                }
            }
        } else if file_type.is_dir() {
            collect_topic_links(base, &path, out);
        }
    }
}

/// Construct an envelope via [`crate::envelope::new`] and enqueue it on
/// the destination's queue.
pub fn send(
    source: &str,
    destination: &str,
    data: &[u8],
    topic: Option<&str>,
    config: &Config,
    signer: &dyn Signer,
) -> Result<()> {
    let destination_dir = endpoint_dir(config, destination);
    if !looks_like_endpoint(&destination_dir) {
        return Err(IpcError::EndpointUnknown(destination.to_string()));
    }

    let token = envelope::new(source, destination, data, topic, config, signer)?;
    queue_for(config, destination).put(token.as_bytes())?;
    Ok(())
}

/// Receive one envelope token from `name`'s queue, waiting according to
/// `timeout`. The caller is responsible for calling
/// [`crate::envelope::validate`].
pub fn recv(name: &str, timeout: Timeout, config: &Config) -> Result<String> {
    let bytes = queue_for(config, name).get(timeout)?;
    String::from_utf8(bytes).map_err(|_| IpcError::MalformedToken)
}

/// Invoke `f` with `(name, envelope_token)` for every message currently
/// in `name`'s queue, in FIFO order, without consuming them.
pub fn foreach_message(name: &str, config: &Config, mut f: impl FnMut(&str, &str)) -> Result<()> {
    let queue = queue_for(config, name);
    let mut err = None;
    queue.foreach(&mut |bytes| match std::str::from_utf8(bytes) {
        Ok(token) => f(name, token),
        Err(_) => err = Some(IpcError::MalformedToken),
    })?;
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
