//! The garbled circuit artifact exchanged between the parties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::{
    cipher::{decrypt_row, Key, KeyPair},
    gate::WireLabel,
};

/// Errors raised when reading a garbled circuit off the wire.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("gate wire {0} has an empty table")]
    EmptyTable(WireLabel),
    #[error("garbled circuit has no entry for sink wire {0}")]
    MissingSink(WireLabel),
}

/// The shuffled, encrypted truth table of one gate.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GarbledTable(#[serde_as(as = "Vec<Base64>")] Vec<Vec<u8>>);

impl GarbledTable {
    pub(crate) fn new(rows: Vec<Vec<u8>>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tries every row in stored order and returns the index and payload of
    /// the first one that decrypts under the given keys.
    ///
    /// `attempts` is incremented once per row tried.
    pub fn open(
        &self,
        key1: &Key,
        key2: Option<&Key>,
        attempts: &mut usize,
    ) -> Option<(usize, Key)> {
        self.0.iter().enumerate().find_map(|(i, row)| {
            *attempts += 1;
            decrypt_row(key1, key2, row).ok().map(|key| (i, key))
        })
    }
}

/// The inputs of a garbled gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateInputs {
    pub input1: WireLabel,
    pub input2: Option<WireLabel>,
}

impl GateInputs {
    pub fn iter(&self) -> impl Iterator<Item = WireLabel> {
        std::iter::once(self.input1).chain(self.input2)
    }
}

/// The resolution state of a single wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireRecord", try_from = "WireRecord")]
pub enum Wire {
    /// A gate wire whose output key is not yet known.
    Unresolved {
        inputs: GateInputs,
        table: GarbledTable,
    },
    /// An external input still holding both of its keys.
    Pending(KeyPair),
    /// An external input whose key is delivered by oblivious transfer.
    Oblivious,
    /// A wire holding the single key matching its actual value.
    Resolved(Key),
}

/// Key/value shape of a wire on the wire: `inputs` + `rows` for unresolved
/// gates, `value` for everything else.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireRecord {
    Gate {
        inputs: Vec<WireLabel>,
        rows: GarbledTable,
    },
    Value {
        value: WireValue,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Key(Key),
    Pair(KeyPair),
    Oblivious,
}

impl From<Wire> for WireRecord {
    fn from(wire: Wire) -> Self {
        match wire {
            Wire::Unresolved { inputs, table } => WireRecord::Gate {
                inputs: inputs.iter().collect(),
                rows: table,
            },
            Wire::Pending(pair) => WireRecord::Value {
                value: WireValue::Pair(pair),
            },
            Wire::Oblivious => WireRecord::Value {
                value: WireValue::Oblivious,
            },
            Wire::Resolved(key) => WireRecord::Value {
                value: WireValue::Key(key),
            },
        }
    }
}

impl TryFrom<WireRecord> for Wire {
    type Error = String;

    fn try_from(record: WireRecord) -> Result<Self, Self::Error> {
        Ok(match record {
            WireRecord::Gate { inputs, rows } => {
                let inputs = match inputs.as_slice() {
                    [input1] => GateInputs {
                        input1: *input1,
                        input2: None,
                    },
                    [input1, input2] => GateInputs {
                        input1: *input1,
                        input2: Some(*input2),
                    },
                    _ => return Err(format!("gate lists {} inputs", inputs.len())),
                };
                Wire::Unresolved {
                    inputs,
                    table: rows,
                }
            }
            WireRecord::Value { value } => match value {
                WireValue::Key(key) => Wire::Resolved(key),
                WireValue::Pair(pair) => Wire::Pending(pair),
                WireValue::Oblivious => Wire::Oblivious,
            },
        })
    }
}

/// A garbled circuit
///
/// Maps every wire reachable from the sink to its [`Wire`] state. Table
/// contents never change once garbled; the evaluator collapses entries to
/// [`Wire::Resolved`] as it learns their keys.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbledCircuit {
    sink: WireLabel,
    #[serde_as(as = "Vec<(_, _)>")]
    wires: BTreeMap<WireLabel, Wire>,
}

impl GarbledCircuit {
    pub(crate) fn new(sink: WireLabel) -> Self {
        Self {
            sink,
            wires: BTreeMap::new(),
        }
    }

    pub fn sink(&self) -> WireLabel {
        self.sink
    }

    pub fn wire(&self, label: WireLabel) -> Option<&Wire> {
        self.wires.get(&label)
    }

    pub fn wires(&self) -> impl Iterator<Item = (WireLabel, &Wire)> {
        self.wires.iter().map(|(label, wire)| (*label, wire))
    }

    pub(crate) fn insert(&mut self, label: WireLabel, wire: Wire) {
        self.wires.insert(label, wire);
    }

    /// Returns the table of gate wire `label`, if it is still unresolved.
    pub fn table(&self, label: WireLabel) -> Option<&GarbledTable> {
        match self.wires.get(&label) {
            Some(Wire::Unresolved { table, .. }) => Some(table),
            _ => None,
        }
    }

    /// Collapses a pending input wire to the key for `bit`.
    ///
    /// Returns the chosen key, or `None` if `label` is not a pending input.
    pub fn choose_input(&mut self, label: WireLabel, bit: bool) -> Option<Key> {
        let entry = self.wires.get_mut(&label)?;
        let Wire::Pending(pair) = entry else {
            return None;
        };
        let key = pair.select(bit);
        *entry = Wire::Resolved(key);
        Some(key)
    }

    /// Withholds both keys of a pending input wire, leaving it to be
    /// delivered by oblivious transfer. Returns the withheld pair.
    pub fn withhold_input(&mut self, label: WireLabel) -> Option<KeyPair> {
        let entry = self.wires.get_mut(&label)?;
        let Wire::Pending(pair) = *entry else {
            return None;
        };
        *entry = Wire::Oblivious;
        Some(pair)
    }

    pub(crate) fn resolve(&mut self, label: WireLabel, key: Key) {
        self.wires.insert(label, Wire::Resolved(key));
    }

    /// Checks the structural well-formedness of a received circuit.
    pub fn validate(&self) -> Result<(), FormatError> {
        if !self.wires.contains_key(&self.sink) {
            return Err(FormatError::MissingSink(self.sink));
        }
        for (label, wire) in &self.wires {
            if let Wire::Unresolved { table, .. } = wire {
                if table.is_empty() {
                    return Err(FormatError::EmptyTable(*label));
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Key {
        Key::from_bytes([byte; crate::cipher::KEY_LEN])
    }

    #[test]
    fn wire_format_keeps_key_value_shape() {
        let mut circuit = GarbledCircuit::new(WireLabel(2));
        circuit.insert(
            WireLabel(2),
            Wire::Unresolved {
                inputs: GateInputs {
                    input1: WireLabel(0),
                    input2: Some(WireLabel(1)),
                },
                table: GarbledTable::new(vec![vec![1, 2, 3], vec![4, 5]]),
            },
        );
        circuit.insert(WireLabel(0), Wire::Resolved(key(1)));
        circuit.insert(WireLabel(1), Wire::Oblivious);
        circuit.insert(WireLabel(3), Wire::Pending(KeyPair(key(2), key(3))));

        let json: serde_json::Value = serde_json::to_value(&circuit).unwrap();
        let wires = json["wires"].as_array().unwrap();

        let gate = &wires.iter().find(|w| w[0] == 2).unwrap()[1];
        assert_eq!(gate["inputs"], serde_json::json!([0, 1]));
        assert_eq!(gate["rows"].as_array().unwrap().len(), 2);

        let resolved = &wires.iter().find(|w| w[0] == 0).unwrap()[1];
        assert!(resolved["value"].is_string());
        let oblivious = &wires.iter().find(|w| w[0] == 1).unwrap()[1];
        assert!(oblivious["value"].is_null());
        let pending = &wires.iter().find(|w| w[0] == 3).unwrap()[1];
        assert_eq!(pending["value"].as_array().unwrap().len(), 2);

        let bytes = circuit.to_json().unwrap();
        assert_eq!(GarbledCircuit::from_json(&bytes).unwrap(), circuit);
    }

    #[test]
    fn rejects_three_input_gate() {
        let json = r#"{"sink": 3, "wires": [[3, {"inputs": [0, 1, 2], "rows": []}]]}"#;
        assert!(GarbledCircuit::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn choose_and_withhold_inputs() {
        let mut circuit = GarbledCircuit::new(WireLabel(5));
        circuit.insert(WireLabel(0), Wire::Pending(KeyPair(key(1), key(2))));
        circuit.insert(WireLabel(1), Wire::Pending(KeyPair(key(3), key(4))));

        assert_eq!(circuit.choose_input(WireLabel(0), true), Some(key(2)));
        assert_eq!(circuit.wire(WireLabel(0)), Some(&Wire::Resolved(key(2))));
        assert_eq!(circuit.choose_input(WireLabel(0), false), None);

        assert_eq!(
            circuit.withhold_input(WireLabel(1)),
            Some(KeyPair(key(3), key(4)))
        );
        assert_eq!(circuit.wire(WireLabel(1)), Some(&Wire::Oblivious));
        assert!(matches!(
            circuit.validate(),
            Err(FormatError::MissingSink(WireLabel(5)))
        ));
    }
}
