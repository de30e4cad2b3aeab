// src/rl/q_table.rs
//
// Dense tabular action-value store.
//
// One slot per StateKey (STATE_SLOT_COUNT of them), three action values per
// slot, all zero-initialized. A visited flag per slot records which keys the
// learner has touched; only visited keys are enumerated or persisted, so the
// table behaves like a lazily-populated map without any hashing.
//
// Persisted form: JSON object keyed by the tuple text of the StateKey, each
// value an object {action label: estimate}. Keys are written sorted; the
// parser is strict and never evaluates stored text.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{PacerError, Result};
use crate::io::atomic_write;
use crate::types::Action;

use super::observation::{StateKey, STATE_SLOT_COUNT};

/// Action values for one state, indexed by `Action::index()`.
pub type ActionValues = [f64; Action::COUNT];

/// Canonical serialized shape.
pub type TableJson = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ValueTable {
    values: Vec<ActionValues>,
    visited: Vec<bool>,
    visited_count: usize,
}

impl Default for ValueTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueTable {
    pub fn new() -> Self {
        Self {
            values: vec![[0.0; Action::COUNT]; STATE_SLOT_COUNT],
            visited: vec![false; STATE_SLOT_COUNT],
            visited_count: 0,
        }
    }

    /// Values for `key`, or None if the key was never visited.
    pub fn get(&self, key: &StateKey) -> Option<&ActionValues> {
        let i = key.encode();
        self.visited[i].then(|| &self.values[i])
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.visited[key.encode()]
    }

    /// Mark `key` visited (its values stay at zero if it is new).
    pub fn ensure(&mut self, key: &StateKey) {
        let i = key.encode();
        if !self.visited[i] {
            self.visited[i] = true;
            self.visited_count += 1;
        }
    }

    /// Values for `key`, initializing an unseen key to zeros first.
    pub fn entry(&mut self, key: &StateKey) -> &mut ActionValues {
        self.ensure(key);
        &mut self.values[key.encode()]
    }

    /// Number of visited keys.
    pub fn len(&self) -> usize {
        self.visited_count
    }

    pub fn is_empty(&self) -> bool {
        self.visited_count == 0
    }

    /// Visited keys in dense-index order.
    pub fn iter(&self) -> impl Iterator<Item = (StateKey, &ActionValues)> + '_ {
        self.visited
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .filter_map(move |(i, _)| StateKey::decode(i).map(|k| (k, &self.values[i])))
    }

    pub fn to_json_map(&self) -> TableJson {
        self.iter()
            .map(|(key, values)| {
                let actions = Action::ALL
                    .iter()
                    .map(|a| (a.as_str().to_string(), values[a.index()]))
                    .collect();
                (key.to_string(), actions)
            })
            .collect()
    }

    /// Canonical pretty JSON (sorted keys).
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_json_map())
            .map_err(|e| PacerError::persistence("<memory>", e.to_string()))
    }

    /// SHA-256 of the canonical JSON, hex-encoded.
    pub fn checksum(&self) -> Result<String> {
        let json = self.to_json_string()?;
        Ok(hex::encode(Sha256::digest(json.as_bytes())))
    }

    /// Parse persisted JSON. `origin` names the source in error messages.
    pub fn from_json_str(json: &str, origin: &str) -> Result<Self> {
        let err = |msg: String| PacerError::persistence(origin, msg);

        let raw: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|e| err(format!("not a JSON object: {e}")))?;

        let mut table = ValueTable::new();
        for (key_text, actions) in raw {
            let key: StateKey = key_text
                .parse()
                .map_err(|e: PacerError| err(e.to_string()))?;
            if table.contains(&key) {
                return Err(err(format!("duplicate state key {key_text}")));
            }
            let actions = actions
                .as_object()
                .ok_or_else(|| err(format!("{key_text}: expected an object of action values")))?;

            let mut values = [0.0; Action::COUNT];
            let mut seen = [false; Action::COUNT];
            for (label, value) in actions {
                let action = Action::parse(label).map_err(|e| err(format!("{key_text}: {e}")))?;
                let v = value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| err(format!("{key_text}: value for '{label}' is not a finite number")))?;
                if seen[action.index()] {
                    return Err(err(format!("{key_text}: duplicate action '{label}'")));
                }
                seen[action.index()] = true;
                values[action.index()] = v;
            }
            if let Some(missing) = Action::ALL.iter().find(|a| !seen[a.index()]) {
                return Err(err(format!("{key_text}: missing action '{missing}'")));
            }
            *table.entry(&key) = values;
        }
        Ok(table)
    }

    /// Write the table atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json_string()?;
        atomic_write(path, json.as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| PacerError::io(path, e))?;
        Self::from_json_str(&contents, &path.display().to_string())
    }
}
