//! Topic-based publish/subscribe, fanned out through a symlink graph.
//!
//! Each topic is a directory under the pub/sub root holding one symlink
//! per subscriber, named by the subscriber's flattened endpoint name. Each
//! subscribing endpoint holds the mirror link under its own
//! `subscriptions/` directory. The two links are created and torn down as
//! a pair; `subscribe` rolls back its first link if the second fails, the
//! same "commit both sides or neither" discipline the fan-out send loop
//! below applies per-subscriber rather than to the whole topic.

use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::endpoint;
use crate::error::Result;
use crate::logger::Logger;
use crate::signer::Signer;

fn flatten(endpoint_name: &str) -> String {
    endpoint_name.replace('/', "_")
}

fn topic_dir(config: &Config, topic: &str) -> PathBuf {
    config.pubsub_root.join(topic)
}

fn subscriber_link(config: &Config, topic: &str, endpoint_name: &str) -> PathBuf {
    topic_dir(config, topic).join(flatten(endpoint_name))
}

fn subscription_link(config: &Config, endpoint_name: &str, topic: &str) -> PathBuf {
    config.endpoints_dir().join(endpoint_name).join("subscriptions").join(topic)
}

/// Establish a subscription: ensure the topic directory exists, then
/// atomically create the two-way symlink pair. If the endpoint-side link
/// cannot be created, the topic-side link is removed to restore the
/// invariant that both always exist together.
pub fn subscribe(endpoint_name: &str, topic: &str, config: &Config) -> Result<()> {
    let topic_dir = topic_dir(config, topic);
    fs::create_dir_all(&topic_dir)?;

    let subscriber_link = subscriber_link(config, topic, endpoint_name);
    if subscriber_link.exists() || subscriber_link.symlink_metadata().is_ok() {
        fs::remove_file(&subscriber_link).ok();
    }
    unix_fs::symlink(endpoint_name, &subscriber_link)?;

    let subscription_link = subscription_link(config, endpoint_name, topic);
    if let Some(parent) = subscription_link.parent() {
        fs::create_dir_all(parent)?;
    }
    if subscription_link.symlink_metadata().is_ok() {
        fs::remove_file(&subscription_link).ok();
    }
    if let Err(e) = unix_fs::symlink(&topic_dir, &subscription_link) {
        let _ = fs::remove_file(&subscriber_link);
        return Err(e.into());
    }

    Ok(())
}

/// Publish `payload` to every endpoint currently subscribed to `topic`.
///
/// Individual send failures are logged and swallowed; pub/sub delivery is
/// best-effort by design, so one unreachable subscriber never prevents
/// delivery to the rest.
pub fn publish(
    source: &str,
    topic: &str,
    payload: &[u8],
    config: &Config,
    signer: &dyn Signer,
    logger: &dyn Logger,
) -> Result<()> {
    let topic_dir = topic_dir(config, topic);
    fs::create_dir_all(&topic_dir)?;

    let entries = match fs::read_dir(&topic_dir) {
        Ok(entries) => entries,
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let link = entry.path();
        let subscriber = match fs::read_link(&link) {
            Ok(target) => target.to_string_lossy().into_owned(),
            Err(e) => {
                logger.log_warn(&format!(
                    "publish({topic}): failed to resolve subscriber link {}: {e}",
                    link.display()
                ));
                continue;
            }
        };

        if let Err(e) = endpoint::send(source, &subscriber, payload, Some(topic), config, signer) {
            logger.log_warn(&format!(
                "publish({topic}): delivery to {subscriber} failed: {e}"
            ));
        }
    }

    Ok(())
}
