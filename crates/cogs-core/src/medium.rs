use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::CoreError;

/// HTTP-date layout used in `expires=` attributes (RFC 7231 IMF-fixdate).
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Per-entry size ceiling. Browsers cap a single cookie around 4 KB; writes
/// past the limit are rejected rather than silently truncated.
pub const MAX_ENTRY_BYTES: usize = 4096;

/// The string-blob storage medium.
///
/// Writes are all-or-nothing replacement of one named entry, expressed as a
/// full cookie-format write string. There is no read-modify-write atomicity
/// across entries; callers layer their own protocols on top.
pub trait Medium: Send + Sync {
    /// The medium's entire live contents as one semicolon-delimited
    /// `"name=value; other=value"` string. Expired entries are absent.
    fn read_all(&self) -> String;

    /// Apply one write string of the form
    /// `"<name>=<value>[; expires=<HTTP-date>][; path=<p>][; domain=<d>][; secure]"`.
    ///
    /// A past `expires` deletes the entry. No `expires` makes the entry
    /// session-scoped (it lives until the medium itself is dropped).
    fn write(&self, entry: &str) -> crate::Result<()>;
}

struct JarEntry {
    name: String,
    value: String,
    expires: Option<DateTime<Utc>>,
}

/// In-process cookie jar.
///
/// Entries are keyed by name alone; `path` and `domain` attributes are
/// accepted and ignored, which matches how the automation scripts always
/// wrote them (a single path per host page).
pub struct MemoryJar {
    entries: Mutex<Vec<JarEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryJar {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Number of live entries, for diagnostics and tests.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        entries.iter().filter(|e| is_live(e, now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryJar {
    fn default() -> Self {
        Self::new()
    }
}

fn is_live(entry: &JarEntry, now: DateTime<Utc>) -> bool {
    entry.expires.is_none_or(|at| at > now)
}

fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

impl Medium for MemoryJar {
    fn read_all(&self) -> String {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|e| is_live(e, now))
            .map(|e| format!("{}={}", e.name, e.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn write(&self, entry: &str) -> crate::Result<()> {
        if entry.len() > MAX_ENTRY_BYTES {
            return Err(CoreError::EntryTooLarge {
                size: entry.len(),
                max: MAX_ENTRY_BYTES,
            });
        }

        let mut segments = entry.split(';');
        let pair = segments.next().unwrap_or("");
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| CoreError::MalformedEntry(entry.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::MalformedEntry(entry.to_string()));
        }

        let mut expires = None;
        for seg in segments {
            let seg = seg.trim();
            if let Some(date) = seg.strip_prefix("expires=") {
                expires = parse_http_date(date);
            }
            // path=, domain= and secure are accepted but not part of identity.
        }

        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| e.name != name && is_live(e, now));

        if expires.is_some_and(|at| at <= now) {
            debug!(name, "medium entry expired on write");
            return Ok(());
        }
        if expires.is_none() {
            warn!(name, "session-scoped medium entry (no expires attribute)");
        }
        entries.push(JarEntry {
            name: name.to_string(),
            value: value.to_string(),
            expires,
        });
        Ok(())
    }
}
