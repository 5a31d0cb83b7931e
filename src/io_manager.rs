//! # IO-Manager
//!
//! A process-wide registry of file paths under active reading or
//! writing, preventing conflicting concurrent transfers of the same
//! path (design document §4.3). Keyed by the canonical (symlink
//! resolved, normalised) form of the path so aliases map to one entry,
//! the same discipline the teacher's `TcpSocketTransport` applies to its
//! `connections` map — one process-wide `Mutex`-guarded table, never
//! touched while holding any other lock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Direction a path is being engaged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

struct State {
    outgoing: HashSet<PathBuf>,
    incoming: HashMap<PathBuf, usize>,
}

static MANAGER: Lazy<Mutex<State>> = Lazy::new(|| {
    Mutex::new(State {
        outgoing: HashSet::new(),
        incoming: HashMap::new(),
    })
});

/// Canonicalise `path` for use as a registry key. Falls back to the
/// original (absolute-ised, not symlink-resolved) path when
/// `canonicalize` fails, e.g. because the file does not exist yet (the
/// INCOMING side reserves a destination before it is created).
pub fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

/// Attempt to engage `path` for `direction`. Returns `true` if accepted.
///
/// - OUTGOING is accepted iff the path is in neither set.
/// - INCOMING is accepted iff the path is not in OUTGOING; multiple
///   concurrent INCOMING readers of the same path are allowed and
///   counted.
pub fn acquire(path: &Path, direction: Direction) -> bool {
    let key = canonical_key(path);
    let mut state = MANAGER.lock();
    match direction {
        Direction::Outgoing => {
            if state.outgoing.contains(&key) || state.incoming.contains_key(&key) {
                false
            } else {
                state.outgoing.insert(key);
                true
            }
        }
        Direction::Incoming => {
            if state.outgoing.contains(&key) {
                false
            } else {
                *state.incoming.entry(key).or_insert(0) += 1;
                true
            }
        }
    }
}

/// Release a previously acquired engagement. A no-op if the path was
/// never engaged for `direction` (defensive against double-release on
/// the abort/complete paths racing each other).
pub fn release(path: &Path, direction: Direction) {
    let key = canonical_key(path);
    let mut state = MANAGER.lock();
    match direction {
        Direction::Outgoing => {
            state.outgoing.remove(&key);
        }
        Direction::Incoming => {
            if let Some(count) = state.incoming.get_mut(&key) {
                if *count <= 1 {
                    state.incoming.remove(&key);
                } else {
                    *count -= 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn outgoing_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.dat");
        fs::write(&path, b"x").unwrap();

        assert!(acquire(&path, Direction::Outgoing));
        assert!(!acquire(&path, Direction::Outgoing));
        assert!(!acquire(&path, Direction::Incoming));
        release(&path, Direction::Outgoing);
        assert!(acquire(&path, Direction::Outgoing));
        release(&path, Direction::Outgoing);
    }

    #[test]
    fn incoming_allows_multiple_readers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.dat");
        fs::write(&path, b"x").unwrap();

        assert!(acquire(&path, Direction::Incoming));
        assert!(acquire(&path, Direction::Incoming));
        assert!(!acquire(&path, Direction::Outgoing));
        release(&path, Direction::Incoming);
        assert!(!acquire(&path, Direction::Outgoing));
        release(&path, Direction::Incoming);
        assert!(acquire(&path, Direction::Outgoing));
        release(&path, Direction::Outgoing);
    }
}
