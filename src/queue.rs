//! Per-endpoint message spool.
//!
//! An endpoint's queue is a directory of sequentially numbered files: `put`
//! allocates the next sequence number and writes a file, `get` takes the
//! oldest file and removes it, `foreach` walks the backlog without
//! consuming it. The sequence counter and each item write are made atomic
//! the same way: write to a sibling temp file, then rename into place.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fd_lock::RwLock as FdRwLock;

use crate::error::{IpcError, Result};

/// How long `get` polls the spool directory before giving up.
///
/// Negative seconds block indefinitely, zero performs a single non-blocking
/// check, and a positive value bounds the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until a message arrives.
    Block,
    /// Check once and return immediately if nothing is queued.
    Immediate,
    /// Poll for up to the given duration.
    After(Duration),
}

impl Timeout {
    /// Build a [`Timeout`] from the spec's signed-seconds convention:
    /// negative blocks, zero is immediate, positive bounds the wait.
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds.cmp(&0) {
            std::cmp::Ordering::Less => Timeout::Block,
            std::cmp::Ordering::Equal => Timeout::Immediate,
            std::cmp::Ordering::Greater => Timeout::After(Duration::from_secs(seconds as u64)),
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const COUNTER_FILE: &str = ".next";

/// A durable, ordered message spool.
pub trait Queue: Send + Sync {
    /// Create the spool if it does not already exist.
    fn init(&self) -> Result<()>;
    /// Remove the spool and everything in it.
    fn destroy(&self) -> Result<()>;
    /// Append a message to the tail of the spool.
    fn put(&self, data: &[u8]) -> Result<()>;
    /// Remove and return the oldest message, waiting according to
    /// `timeout`.
    fn get(&self, timeout: Timeout) -> Result<Vec<u8>>;
    /// Invoke `f` with every queued message, oldest first, without
    /// removing any of them.
    fn foreach(&self, f: &mut dyn FnMut(&[u8])) -> Result<()>;
}

/// Reference [`Queue`] backed by a directory of sequentially numbered
/// files.
pub struct FsQueue {
    dir: PathBuf,
}

impl FsQueue {
    /// Build a queue rooted at `dir`. Does not touch the filesystem; call
    /// [`FsQueue::init`] to create it.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn counter_path(&self) -> PathBuf {
        self.dir.join(COUNTER_FILE)
    }

    /// Atomically increment and return the next sequence number.
    fn next_seq(&self) -> Result<u64> {
        let counter_path = self.counter_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&counter_path)?;
        let mut rw_lock = FdRwLock::new(lock_file);
        let mut guard = rw_lock.write()?;

        let mut contents = String::new();
        guard.read_to_string(&mut contents)?;
        let current: u64 = contents.trim().parse().unwrap_or(0);
        let next = current + 1;

        let tmp_path = counter_path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(next.to_string().as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &counter_path)?;

        Ok(next)
    }

    /// List item file paths in ascending sequence order.
    fn list_items(&self) -> Result<Vec<PathBuf>> {
        let mut items: Vec<(u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Ok(seq) = name.parse::<u64>() {
                    items.push((seq, path));
                }
            }
        }
        items.sort_by_key(|(seq, _)| *seq);
        Ok(items.into_iter().map(|(_, path)| path).collect())
    }

    fn take_oldest(&self) -> Result<Option<Vec<u8>>> {
        for path in self.list_items()? {
            match fs::read(&path) {
                Ok(data) => {
                    if fs::remove_file(&path).is_ok() {
                        return Ok(Some(data));
                    }
                    // Another consumer won the race; keep scanning.
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

fn is_missing(path: &Path) -> bool {
    !path.exists()
}

impl Queue for FsQueue {
    fn init(&self) -> Result<()> {
        if is_missing(&self.dir) {
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn put(&self, data: &[u8]) -> Result<()> {
        let seq = self.next_seq()?;
        let final_path = self.dir.join(seq.to_string());
        let tmp_path = self.dir.join(format!("{seq}.tmp"));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    fn get(&self, timeout: Timeout) -> Result<Vec<u8>> {
        match timeout {
            Timeout::Immediate => self.take_oldest()?.ok_or(IpcError::Timeout),
            Timeout::Block => loop {
                if let Some(data) = self.take_oldest()? {
                    return Ok(data);
                }
                std::thread::sleep(POLL_INTERVAL);
            },
            Timeout::After(duration) => {
                let deadline = Instant::now() + duration;
                loop {
                    if let Some(data) = self.take_oldest()? {
                        return Ok(data);
                    }
                    if Instant::now() >= deadline {
                        return Err(IpcError::Timeout);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    fn foreach(&self, f: &mut dyn FnMut(&[u8])) -> Result<()> {
        for path in self.list_items()? {
            if let Ok(data) = fs::read(&path) {
                f(&data);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_queue() -> (tempfile::TempDir, FsQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = FsQueue::new(dir.path().join("spool"));
        queue.init().unwrap();
        (dir, queue)
    }

    #[test]
    fn test_put_then_get_is_fifo() {
        let (_dir, queue) = temp_queue();
        queue.put(b"first").unwrap();
        queue.put(b"second").unwrap();
        queue.put(b"third").unwrap();

        assert_eq!(queue.get(Timeout::Immediate).unwrap(), b"first");
        assert_eq!(queue.get(Timeout::Immediate).unwrap(), b"second");
        assert_eq!(queue.get(Timeout::Immediate).unwrap(), b"third");
    }

    #[test]
    fn test_get_immediate_times_out_on_empty_queue() {
        let (_dir, queue) = temp_queue();
        let err = queue.get(Timeout::Immediate).unwrap_err();
        assert!(matches!(err, IpcError::Timeout));
    }

    #[test]
    fn test_get_after_times_out_when_nothing_arrives() {
        let (_dir, queue) = temp_queue();
        let err = queue
            .get(Timeout::After(Duration::from_millis(60)))
            .unwrap_err();
        assert!(matches!(err, IpcError::Timeout));
    }

    #[test]
    fn test_foreach_does_not_consume() {
        let (_dir, queue) = temp_queue();
        queue.put(b"a").unwrap();
        queue.put(b"b").unwrap();

        let mut seen = Vec::new();
        queue
            .foreach(&mut |data| seen.push(data.to_vec()))
            .unwrap();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);

        // Still there after foreach.
        assert_eq!(queue.get(Timeout::Immediate).unwrap(), b"a");
        assert_eq!(queue.get(Timeout::Immediate).unwrap(), b"b");
    }

    #[test]
    fn test_destroy_removes_directory() {
        let (dir, queue) = temp_queue();
        queue.put(b"a").unwrap();
        queue.destroy().unwrap();
        assert!(!dir.path().join("spool").exists());
    }

    #[test]
    fn test_timeout_from_seconds() {
        assert_eq!(Timeout::from_seconds(-1), Timeout::Block);
        assert_eq!(Timeout::from_seconds(0), Timeout::Immediate);
        assert_eq!(
            Timeout::from_seconds(5),
            Timeout::After(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_sequence_counter_survives_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");

        let queue_a = FsQueue::new(&spool);
        queue_a.init().unwrap();
        queue_a.put(b"one").unwrap();

        let queue_b = FsQueue::new(&spool);
        queue_b.put(b"two").unwrap();

        assert_eq!(queue_b.get(Timeout::Immediate).unwrap(), b"one");
        assert_eq!(queue_b.get(Timeout::Immediate).unwrap(), b"two");
    }
}
