//! Single-writer "latest value" cell shared between the detection loop and its
//! readers (HTTP handlers, display window).
//!
//! Publishing swaps in a new `Arc` under the lock, so a reader sees either the
//! previous snapshot or the new one, never a mix. No history is kept.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

struct Slot<T> {
    sequence: u64,
    value: Option<Arc<T>>,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    changed: Condvar,
}

/// Create a connected writer/reader pair.
pub fn channel<T>() -> (LatestWriter<T>, LatestReader<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            sequence: 0,
            value: None,
        }),
        changed: Condvar::new(),
    });
    (
        LatestWriter {
            shared: shared.clone(),
        },
        LatestReader { shared },
    )
}

/// The only handle that can publish. Deliberately not `Clone`.
pub struct LatestWriter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LatestWriter<T> {
    /// Replace the current value. Returns the new sequence number (starts at 1).
    pub fn publish(&self, value: T) -> Result<u64> {
        let value = Arc::new(value);
        let mut slot = self
            .shared
            .slot
            .lock()
            .map_err(|_| anyhow!("latest slot lock poisoned"))?;
        slot.sequence += 1;
        slot.value = Some(value);
        let sequence = slot.sequence;
        drop(slot);
        self.shared.changed.notify_all();
        Ok(sequence)
    }

    pub fn reader(&self) -> LatestReader<T> {
        LatestReader {
            shared: self.shared.clone(),
        }
    }
}

/// Read-only handle.
pub struct LatestReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for LatestReader<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> LatestReader<T> {
    /// Latest value and its sequence number, if anything was published.
    pub fn latest(&self) -> Result<Option<(u64, Arc<T>)>> {
        let slot = self
            .shared
            .slot
            .lock()
            .map_err(|_| anyhow!("latest slot lock poisoned"))?;
        Ok(slot.value.clone().map(|value| (slot.sequence, value)))
    }

    pub fn sequence(&self) -> Result<u64> {
        let slot = self
            .shared
            .slot
            .lock()
            .map_err(|_| anyhow!("latest slot lock poisoned"))?;
        Ok(slot.sequence)
    }

    /// Wait up to `timeout` for a value newer than `after`.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Result<Option<(u64, Arc<T>)>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self
            .shared
            .slot
            .lock()
            .map_err(|_| anyhow!("latest slot lock poisoned"))?;
        loop {
            if slot.sequence > after {
                if let Some(value) = slot.value.clone() {
                    return Ok(Some((slot.sequence, value)));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(slot, deadline - now)
                .map_err(|_| anyhow!("latest slot lock poisoned"))?;
            slot = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn empty_until_first_publish() -> Result<()> {
        let (writer, reader) = channel::<u32>();
        assert!(reader.latest()?.is_none());
        assert_eq!(reader.sequence()?, 0);

        assert_eq!(writer.publish(7)?, 1);
        let (seq, value) = reader.latest()?.expect("published");
        assert_eq!((seq, *value), (1, 7));
        Ok(())
    }

    #[test]
    fn last_write_wins() -> Result<()> {
        let (writer, reader) = channel::<&'static str>();
        writer.publish("a")?;
        writer.publish("b")?;
        let (seq, value) = reader.latest()?.unwrap();
        assert_eq!(seq, 2);
        assert_eq!(*value, "b");
        Ok(())
    }

    #[test]
    fn wait_newer_times_out_without_publish() -> Result<()> {
        let (writer, reader) = channel::<u8>();
        writer.publish(1)?;
        assert!(reader.wait_newer(1, Duration::from_millis(20))?.is_none());
        assert!(reader.wait_newer(0, Duration::from_millis(20))?.is_some());
        Ok(())
    }

    #[test]
    fn wait_newer_wakes_on_publish() -> Result<()> {
        let (writer, reader) = channel::<u64>();
        let waiter = thread::spawn(move || reader.wait_newer(0, Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        writer.publish(42)?;
        let got = waiter.join().expect("waiter thread")?;
        assert_eq!(got.map(|(_, v)| *v), Some(42));
        Ok(())
    }

    #[test]
    fn readers_never_observe_torn_pairs() -> Result<()> {
        let (writer, reader) = channel::<(u64, Vec<u64>)>();
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let reader_stop = stop.clone();
        let handle = thread::spawn(move || -> Result<()> {
            while !reader_stop.load(std::sync::atomic::Ordering::SeqCst) {
                if let Some((_, pair)) = reader.latest()? {
                    let (n, items) = &*pair;
                    assert!(items.iter().all(|v| v == n));
                }
            }
            Ok(())
        });
        for n in 0..500u64 {
            writer.publish((n, vec![n; 16]))?;
        }
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
        handle.join().expect("reader thread")?;
        Ok(())
    }
}
