//! Evaluation of a garbled circuit from one key per input wire.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, instrument, trace};

use crate::{
    cipher::{Key, KeyPair},
    garbled::{GarbledCircuit, Wire},
    gate::WireLabel,
};

/// Errors that can occur during garbled circuit evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    #[error("no key supplied for input wire {0}")]
    MissingInputKey(WireLabel),
    #[error("no row of gate {0} decrypts under the resolved input keys")]
    DecryptionFailure(WireLabel),
    #[error("sink key matches neither clear marker")]
    UnresolvedOutput,
    #[error("wire {0} depends on itself")]
    Cycle(WireLabel),
    #[error("wire {0} is not part of the garbled circuit")]
    UnknownWire(WireLabel),
    #[error("wire {0} is not an external input")]
    NotAnInput(WireLabel),
}

#[derive(Clone, Copy)]
enum Slot {
    Unvisited,
    InProgress,
    Done(Key),
}

/// Evaluates garbled circuits.
///
/// Resolution is iterative: an explicit stack replaces recursion and every
/// wire sits in an index-addressed arena of slots, so an accidental cycle is
/// reported as [`EvaluateError::Cycle`]. Resolved keys are written back into
/// the [`GarbledCircuit`], which makes later requests for the same wire free.
#[derive(Debug, Default)]
pub struct Evaluator {
    decryptions: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row decryptions attempted so far.
    pub fn decryptions(&self) -> usize {
        self.decryptions
    }

    /// Installs the evaluator's keys for external input wires.
    pub fn set_inputs(
        &self,
        circuit: &mut GarbledCircuit,
        keys: &BTreeMap<WireLabel, Key>,
    ) -> Result<(), EvaluateError> {
        for (&wire, &key) in keys {
            match circuit.wire(wire) {
                Some(Wire::Pending(_)) | Some(Wire::Oblivious) => circuit.resolve(wire, key),
                Some(Wire::Resolved(existing)) if *existing == key => {}
                Some(_) => return Err(EvaluateError::NotAnInput(wire)),
                None => return Err(EvaluateError::UnknownWire(wire)),
            }
        }
        Ok(())
    }

    /// Evaluates `circuit` and returns the clear output bit.
    ///
    /// `input_keys` supplies the key matching the actual value of each
    /// external input not already resolved in `circuit`.
    #[instrument(level = "debug", skip_all, err)]
    pub fn evaluate(
        &mut self,
        circuit: &mut GarbledCircuit,
        input_keys: &BTreeMap<WireLabel, Key>,
    ) -> Result<bool, EvaluateError> {
        self.set_inputs(circuit, input_keys)?;

        let key = self.resolve(circuit, circuit.sink())?;
        let output = KeyPair::clear_markers()
            .decode(&key)
            .ok_or(EvaluateError::UnresolvedOutput)?;

        debug!(output, decryptions = self.decryptions, "evaluated circuit");

        Ok(output)
    }

    /// Resolves the key carried by `target`.
    pub fn resolve(
        &mut self,
        circuit: &mut GarbledCircuit,
        target: WireLabel,
    ) -> Result<Key, EvaluateError> {
        let labels = circuit.wires().map(|(label, _)| label).collect::<Vec<_>>();
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (*label, i))
            .collect::<HashMap<_, _>>();
        let mut slots = vec![Slot::Unvisited; labels.len()];

        let lookup = |label: WireLabel| {
            index
                .get(&label)
                .copied()
                .ok_or(EvaluateError::UnknownWire(label))
        };

        let mut stack = vec![lookup(target)?];
        while let Some(&i) = stack.last() {
            let label = labels[i];
            let wire = circuit.wire(label).ok_or(EvaluateError::UnknownWire(label))?;

            let (inputs, table) = match (slots[i], wire) {
                (Slot::Done(_), _) => {
                    stack.pop();
                    continue;
                }
                (_, Wire::Resolved(key)) => {
                    slots[i] = Slot::Done(*key);
                    stack.pop();
                    continue;
                }
                (_, Wire::Pending(_)) | (_, Wire::Oblivious) => {
                    return Err(EvaluateError::MissingInputKey(label));
                }
                (slot, Wire::Unresolved { inputs, table }) => {
                    if let Slot::Unvisited = slot {
                        slots[i] = Slot::InProgress;
                        let mut expanded = false;
                        for input in inputs.iter() {
                            let j = lookup(input)?;
                            match slots[j] {
                                Slot::Done(_) => {}
                                Slot::InProgress => return Err(EvaluateError::Cycle(input)),
                                Slot::Unvisited => {
                                    stack.push(j);
                                    expanded = true;
                                }
                            }
                        }
                        if expanded {
                            continue;
                        }
                    }
                    (*inputs, table)
                }
            };

            let key_of = |label: WireLabel| match slots[index[&label]] {
                Slot::Done(key) => Ok(key),
                _ => Err(EvaluateError::MissingInputKey(label)),
            };
            let key1 = key_of(inputs.input1)?;
            let key2 = inputs.input2.map(key_of).transpose()?;

            let (row, key) = table
                .open(&key1, key2.as_ref(), &mut self.decryptions)
                .ok_or(EvaluateError::DecryptionFailure(label))?;
            trace!(wire = %label, row, "resolved gate");

            slots[i] = Slot::Done(key);
            circuit.resolve(label, key);
            stack.pop();
        }

        match slots[lookup(target)?] {
            Slot::Done(key) => Ok(key),
            _ => Err(EvaluateError::MissingInputKey(target)),
        }
    }
}
