//! Fragment naming
//!
//! A fragment name is `__<node>_<thread>_<ms>_<seq>`:
//! - `node`: network interface address of this machine (alphanumerics only)
//! - `thread`: hash of the writing thread's id
//! - `ms`: creation time in milliseconds since the epoch
//! - `seq`: per-process counter, so one thread never produces the same name
//!   twice within a millisecond

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::FRAGMENT_PREFIX;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);
static NODE_ID: OnceLock<String> = OnceLock::new();

/// Freshly allocated fragment identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FragmentName {
    pub name: String,
    pub timestamp_ms: u64,
    pub sequence: u64,
}

impl FragmentName {
    /// Allocate a name unique among concurrent writers
    pub fn generate() -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        let thread = hasher.finish();

        Self {
            name: format!(
                "{}{}_{}_{}_{}",
                FRAGMENT_PREFIX,
                node_id(),
                thread,
                timestamp_ms,
                sequence
            ),
            timestamp_ms,
            sequence,
        }
    }
}

/// Hardware address of the first non-loopback interface, or "0"
fn node_id() -> &'static str {
    NODE_ID.get_or_init(|| {
        let entries = match fs::read_dir("/sys/class/net") {
            Ok(entries) => entries,
            Err(_) => return "0".to_string(),
        };

        let mut names: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        names.sort();
        for path in names {
            if let Ok(address) = fs::read_to_string(path.join("address")) {
                let id: String = address.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
                if !id.is_empty() && id.chars().any(|c| c != '0') {
                    return id;
                }
            }
        }
        "0".to_string()
    })
}
