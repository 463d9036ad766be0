use std::fmt::Write as _;
use std::sync::Arc;

use cogs_core::{Clock, Medium, SystemClock};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::jar;
use crate::types::{ModifyOp, WriteOptions};

/// A namespaced, TTL-aware key-value store over a string-blob medium.
///
/// Each instance owns a registry of the keys it has written, persisted in
/// the medium itself under `"<owner>-List"`. The registry is the
/// authoritative enumeration of this owner's keys; [`get`] alone may read
/// keys outside it.
///
/// The registry can drift from the medium (a crash between the registry
/// write and the value write in [`add`] leaves a registered key with no
/// value). Drift is bounded and harmless: such a key reads as absent.
///
/// [`add`]: CookieStore::add
/// [`get`]: CookieStore::get
pub struct CookieStore {
    owner: String,
    list_key: String,
    registry: Vec<String>,
    medium: Arc<dyn Medium>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore")
            .field("owner", &self.owner)
            .field("list_key", &self.list_key)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl CookieStore {
    /// Create a store for `owner`, loading its registry from the medium.
    /// An absent or unreadable registry starts empty.
    pub fn new(owner: &str, medium: Arc<dyn Medium>, clock: Arc<dyn Clock>) -> Result<Self> {
        if owner.is_empty() {
            return Err(StoreError::InvalidOwner);
        }
        let list_key = format!("{owner}-List");
        let registry = match jar::lookup(&medium.read_all(), &list_key) {
            Some(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(owner, error = %e, "unreadable key registry, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        debug!(owner, keys = registry.len(), "store loaded");
        Ok(Self {
            owner: owner.to_string(),
            list_key,
            registry,
            medium,
            clock,
        })
    }

    /// Like [`CookieStore::new`] with the system clock.
    pub fn with_defaults(owner: &str, medium: Arc<dyn Medium>) -> Result<Self> {
        Self::new(owner, medium, Arc::new(SystemClock))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Write `value` at `key` with default options (7-day TTL, path `/`).
    pub fn add(&mut self, key: &str, value: Value) -> Result<()> {
        self.add_with(key, value, &WriteOptions::default())
    }

    /// Write `value` at `key`. Registers the key first if this owner has
    /// never written it; registration is idempotent.
    pub fn add_with(&mut self, key: &str, value: Value, options: &WriteOptions) -> Result<()> {
        if !self.registry.iter().any(|k| k == key) {
            self.registry.push(key.to_string());
            self.persist_registry()?;
        }
        self.write_value(key, &value, options)?;
        debug!(owner = %self.owner, key, days = options.days, "entry written");
        Ok(())
    }

    /// Read a key from the medium. Not restricted to this owner's registry.
    ///
    /// Returns `None` when the key is absent. A value that fails to parse
    /// as JSON degrades to its raw decoded text; reads never error.
    pub fn get(&self, key: &str) -> Option<Value> {
        let raw = jar::lookup(&self.medium.read_all(), key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(_) => Some(Value::String(raw)),
        }
    }

    /// Erase a registered key: expire it in the medium, then drop it from
    /// the registry. Unregistered keys are left alone.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.remove_with(key, &WriteOptions::default())
    }

    /// [`CookieStore::remove`] with explicit path/domain scope matching the
    /// original write.
    pub fn remove_with(&mut self, key: &str, options: &WriteOptions) -> Result<()> {
        if !self.registry.iter().any(|k| k == key) {
            return Ok(());
        }
        self.write_value(key, &Value::String(String::new()), &options.expired())?;
        self.registry.retain(|k| k != key);
        self.persist_registry()?;
        debug!(owner = %self.owner, key, "entry removed");
        Ok(())
    }

    /// Expire every registered key and clear the registry.
    pub fn reset(&mut self) -> Result<()> {
        let expired = WriteOptions::default().expired();
        for key in std::mem::take(&mut self.registry) {
            self.write_value(&key, &Value::String(String::new()), &expired)?;
        }
        self.persist_registry()?;
        info!(owner = %self.owner, "store reset");
        Ok(())
    }

    /// Registry membership. O(registry size); never scans the medium.
    pub fn has(&self, key: &str) -> bool {
        self.registry.iter().any(|k| k == key)
    }

    /// This owner's keys in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.registry
    }

    /// Apply an arithmetic operation to a registered numeric value, write
    /// the result back, and return it.
    ///
    /// For an unregistered key, `Add`/`Sub` seed it with `operand` /
    /// `-operand`; `Mul`/`Div` do nothing. Returns `None` when nothing was
    /// computed (unknown key with `Mul`/`Div`, or a non-numeric value).
    pub fn modify(&mut self, key: &str, op: ModifyOp, operand: f64) -> Result<Option<Value>> {
        self.modify_with(key, op, operand, &WriteOptions::default())
    }

    pub fn modify_with(
        &mut self,
        key: &str,
        op: ModifyOp,
        operand: f64,
        options: &WriteOptions,
    ) -> Result<Option<Value>> {
        if self.has(key) {
            let Some(current) = self.get(key).as_ref().and_then(Value::as_f64) else {
                warn!(owner = %self.owner, key, "modify on non-numeric value ignored");
                return Ok(None);
            };
            let next = op.apply(current, operand);
            let value = serde_json::Number::from_f64(next)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            self.write_value(key, &value, options)?;
            return Ok(Some(value));
        }
        match op {
            ModifyOp::Add => self.add_with(key, serde_json::json!(operand), options)?,
            ModifyOp::Sub => self.add_with(key, serde_json::json!(-operand), options)?,
            ModifyOp::Mul | ModifyOp::Div => return Ok(None),
        }
        Ok(self.get(key))
    }

    /// Render one owned key (or, with `None`, all of them) as
    /// `"name = value"` diagnostic lines.
    pub fn stringify(&self, key: Option<&str>) -> String {
        if let Some(key) = key {
            if !self.has(key) {
                return String::new();
            }
            return format!("{key} = {}", self.get(key).unwrap_or(Value::Null));
        }
        let mut out = String::new();
        for key in &self.registry {
            let _ = writeln!(out, "{key} = {}", self.get(key).unwrap_or(Value::Null));
        }
        out
    }

    fn persist_registry(&self) -> Result<()> {
        let json = serde_json::to_string(&self.registry)?;
        let entry = jar::format_entry(
            &self.list_key,
            &json,
            &WriteOptions::default(),
            self.clock.now(),
        );
        self.medium.write(&entry)?;
        Ok(())
    }

    fn write_value(&self, key: &str, value: &Value, options: &WriteOptions) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let entry = jar::format_entry(key, &json, options, self.clock.now());
        self.medium.write(&entry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cogs_core::{ManualClock, MemoryJar};
    use serde_json::json;

    fn store() -> CookieStore {
        CookieStore::with_defaults("Test", Arc::new(MemoryJar::new())).unwrap()
    }

    #[test]
    fn empty_owner_is_rejected() {
        let err = CookieStore::with_defaults("", Arc::new(MemoryJar::new())).unwrap_err();
        assert!(matches!(err, StoreError::InvalidOwner));
    }

    #[test]
    fn round_trips_structured_values() {
        let mut store = store();
        let value = json!({
            "permit": "BLD-2024-0042",
            "fees": [125.5, 80.0],
            "approved": true,
            "note": null
        });
        store.add("record", value.clone()).unwrap();
        assert_eq!(store.get("record"), Some(value));
    }

    #[test]
    fn registry_tracks_membership() {
        let mut store = store();
        store.add("a", json!(1)).unwrap();
        store.add("b", json!(2)).unwrap();
        assert!(store.has("a"));
        assert_eq!(store.keys(), ["a", "b"]);

        store.remove("a").unwrap();
        assert!(!store.has("a"));
        assert_eq!(store.keys(), ["b"]);
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn add_is_idempotent_in_the_registry() {
        let mut store = store();
        store.add("k", json!("first")).unwrap();
        store.add("k", json!("second")).unwrap();
        assert_eq!(store.keys(), ["k"]);
        assert_eq!(store.get("k"), Some(json!("second")));
    }

    #[test]
    fn reset_clears_everything() {
        let mut store = store();
        store.add("a", json!(1)).unwrap();
        store.add("b", json!(2)).unwrap();
        store.reset().unwrap();
        assert!(store.keys().is_empty());
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), None);
    }

    #[test]
    fn registry_survives_reconstruction() {
        let medium: Arc<MemoryJar> = Arc::new(MemoryJar::new());
        {
            let mut store = CookieStore::with_defaults("Owner", medium.clone()).unwrap();
            store.add("a", json!(1)).unwrap();
            store.add("b", json!([1, 2])).unwrap();
        }
        let store = CookieStore::with_defaults("Owner", medium).unwrap();
        assert_eq!(store.keys(), ["a", "b"]);
        assert_eq!(store.get("b"), Some(json!([1, 2])));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::default());
        let medium = Arc::new(MemoryJar::with_clock(clock.clone()));
        let mut store = CookieStore::new("Owner", medium, clock.clone()).unwrap();
        store
            .add_with("k", json!("v"), &WriteOptions::days(1))
            .unwrap();
        assert_eq!(store.get("k"), Some(json!("v")));

        clock.advance(Duration::days(2));
        assert_eq!(store.get("k"), None);
        // Registry drift after expiry: still registered, reads as absent.
        assert!(store.has("k"));
    }

    #[test]
    fn malformed_value_degrades_to_raw_text() {
        let medium: Arc<MemoryJar> = Arc::new(MemoryJar::new());
        medium.write("broken={not%20json; path=/").unwrap();
        let store = CookieStore::with_defaults("Owner", medium).unwrap();
        assert_eq!(store.get("broken"), Some(json!("{not json")));
    }

    #[test]
    fn get_reads_keys_outside_the_registry() {
        let medium: Arc<MemoryJar> = Arc::new(MemoryJar::new());
        medium.write("foreign=42; path=/").unwrap();
        let store = CookieStore::with_defaults("Owner", medium).unwrap();
        assert_eq!(store.get("foreign"), Some(json!(42)));
        assert!(!store.has("foreign"));
    }

    #[test]
    fn modify_applies_arithmetic() {
        let mut store = store();
        store.add("count", json!(10.0)).unwrap();
        let result = store.modify("count", ModifyOp::Add, 5.0).unwrap();
        assert_eq!(result, Some(json!(15.0)));
        let result = store.modify("count", ModifyOp::Mul, 2.0).unwrap();
        assert_eq!(result, Some(json!(30.0)));
        assert_eq!(store.get("count"), Some(json!(30.0)));
    }

    #[test]
    fn modify_seeds_missing_keys_for_additive_ops() {
        let mut store = store();
        assert_eq!(
            store.modify("fresh", ModifyOp::Sub, 3.0).unwrap(),
            Some(json!(-3.0))
        );
        assert!(store.has("fresh"));
        assert_eq!(store.modify("other", ModifyOp::Mul, 3.0).unwrap(), None);
        assert!(!store.has("other"));
    }

    #[test]
    fn stringify_renders_owned_entries() {
        let mut store = store();
        store.add("a", json!(1)).unwrap();
        store.add("b", json!({"x": true})).unwrap();
        assert_eq!(store.stringify(Some("a")), "a = 1");
        assert_eq!(store.stringify(Some("missing")), "");
        let all = store.stringify(None);
        assert!(all.contains("a = 1\n"));
        assert!(all.contains("b = {\"x\":true}\n"));
    }
}
