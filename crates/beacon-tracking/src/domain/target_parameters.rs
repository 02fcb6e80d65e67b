//! Target parameter history codec
//!
//! Targeting decisions downstream read a compact per-device history of
//! selected event properties. Each `TargetParameterDefinition` maps a wire
//! property (`key`) to a persisted slot (`store_key`) and says how the slot is
//! encoded:
//!
//! ```text
//! cardinality 1, no related key   value
//! cardinality 1, related key      value|related|yyyy-MM-dd HH:mm:ss
//! cardinality N                   value|ts~value|ts~...   (newest first, <= 9)
//! ```
//!
//! The codec is pure: `(stored history, event properties, timestamp)` maps to
//! a new history. Exact delimiter and truncation behavior is load-bearing for
//! targeting, so neither may change without a migration.

use super::entities::EventRecord;
use crate::error::CodecDecodeError;
use std::collections::BTreeMap;

/// Persisted history: `store_key -> encoded string`
pub type TargetParameterHistory = BTreeMap<String, String>;

/// Separates entries of a cardinality-N slot
pub const ENTRY_SEPARATOR: char = '~';

/// Separates fields inside one entry
pub const FIELD_SEPARATOR: char = '|';

/// Maximum entries a cardinality-N slot retains, the new entry included
pub const MAX_HISTORY_ENTRIES: usize = 9;

/// Related value written when the related property is absent
pub const MISSING_RELATED_VALUE: &str = "0";

/// Whether a slot keeps a single value or a bounded list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Static table entry describing one persisted slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetParameterDefinition {
    pub key: &'static str,
    pub store_key: &'static str,
    /// Zero or one element in practice; only the first is consulted
    pub related_keys: &'static [&'static str],
    pub cardinality: Cardinality,
}

impl TargetParameterDefinition {
    pub const fn single(key: &'static str, store_key: &'static str) -> Self {
        Self {
            key,
            store_key,
            related_keys: &[],
            cardinality: Cardinality::One,
        }
    }

    pub const fn related(
        key: &'static str,
        store_key: &'static str,
        related_keys: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            store_key,
            related_keys,
            cardinality: Cardinality::One,
        }
    }

    pub const fn history(key: &'static str, store_key: &'static str) -> Self {
        Self {
            key,
            store_key,
            related_keys: &[],
            cardinality: Cardinality::Many,
        }
    }
}

/// Slots tracked for every device.
pub const STANDARD_DEFINITIONS: &[TargetParameterDefinition] = &[
    TargetParameterDefinition::single("OM.OSS", "OM.voss"),
    TargetParameterDefinition::single("OM.cname", "OM.vcname"),
    TargetParameterDefinition::single("OM.cmedium", "OM.vcmedium"),
    TargetParameterDefinition::single("OM.csource", "OM.vcsource"),
    TargetParameterDefinition::single("OM.vseg", "OM.vseg"),
    TargetParameterDefinition::single("OM.bd", "OM.bd"),
    TargetParameterDefinition::single("OM.gn", "OM.gn"),
    TargetParameterDefinition::single("OM.loc", "OM.loc"),
    TargetParameterDefinition::single("OM.pv", "OM.vpv"),
    TargetParameterDefinition::history("OM.pv", "OM.lpvs"),
    TargetParameterDefinition::related("OM.pv", "OM.lpvt", &["OM.pv.1"]),
    TargetParameterDefinition::single("OM.clist", "OM.vcat"),
    TargetParameterDefinition::history("OM.clist", "OM.lcats"),
    TargetParameterDefinition::single("OM.pbid", "OM.bid"),
    TargetParameterDefinition::related("OM.pb", "OM.bpv", &["OM.pu"]),
    TargetParameterDefinition::single("OM.ppr", "OM.lpp"),
    TargetParameterDefinition::history("OM.kw", "OM.lkwd"),
];

/// One decoded `value|timestamp` entry of a cardinality-N slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub value: String,
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.value, FIELD_SEPARATOR, self.timestamp)
    }
}

/// Decode one fragment; anything but exactly two fields is malformed.
pub fn decode_entry(fragment: &str) -> Result<HistoryEntry, CodecDecodeError> {
    let fields: Vec<&str> = fragment.split(FIELD_SEPARATOR).collect();
    match fields.as_slice() {
        [value, timestamp] => Ok(HistoryEntry {
            value: (*value).to_string(),
            timestamp: (*timestamp).to_string(),
        }),
        _ => Err(CodecDecodeError {
            fragment: fragment.to_string(),
            fields: fields.len(),
        }),
    }
}

/// Decode a cardinality-N slot, newest first. Malformed fragments are dropped.
pub fn decode_history(encoded: &str) -> Vec<HistoryEntry> {
    if encoded.is_empty() {
        return Vec::new();
    }
    encoded
        .split(ENTRY_SEPARATOR)
        .filter_map(|fragment| match decode_entry(fragment) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed history fragment");
                None
            }
        })
        .collect()
}

/// Pure encoder for target parameter history.
#[derive(Clone, Debug)]
pub struct TargetParameterCodec {
    definitions: &'static [TargetParameterDefinition],
}

impl Default for TargetParameterCodec {
    fn default() -> Self {
        Self::new(STANDARD_DEFINITIONS)
    }
}

impl TargetParameterCodec {
    pub fn new(definitions: &'static [TargetParameterDefinition]) -> Self {
        Self { definitions }
    }

    pub fn definitions(&self) -> &'static [TargetParameterDefinition] {
        self.definitions
    }

    /// Fold one event's properties into the stored history.
    ///
    /// `timestamp` is generated once per recorded event and shared by every
    /// slot updated from it.
    pub fn apply(
        &self,
        stored: &TargetParameterHistory,
        properties: &EventRecord,
        timestamp: &str,
    ) -> TargetParameterHistory {
        let mut history = stored.clone();

        for definition in self.definitions {
            let Some(value) = properties.get(definition.key).filter(|v| !v.is_empty()) else {
                continue;
            };

            let encoded = match definition.cardinality {
                Cardinality::One => match definition.related_keys.first() {
                    None => value.clone(),
                    Some(related_key) => {
                        let related = properties
                            .get(*related_key)
                            .map(|v| v.trim())
                            .unwrap_or(MISSING_RELATED_VALUE);
                        format!(
                            "{value}{sep}{related}{sep}{timestamp}",
                            sep = FIELD_SEPARATOR
                        )
                    }
                },
                Cardinality::Many => {
                    let newest = HistoryEntry {
                        value: value.clone(),
                        timestamp: timestamp.to_string(),
                    };
                    let previous = history
                        .get(definition.store_key)
                        .map(|encoded| decode_history(encoded))
                        .unwrap_or_default();

                    std::iter::once(newest)
                        .chain(previous)
                        .take(MAX_HISTORY_ENTRIES)
                        .map(|entry| entry.encode())
                        .collect::<Vec<_>>()
                        .join(&ENTRY_SEPARATOR.to_string())
                }
            };

            history.insert(definition.store_key.to_string(), encoded);
        }

        history
    }
}
