//! Garbling: assigns key pairs to wires and encrypts every gate's table.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, BinaryHeap},
};

use rand::{seq::SliceRandom, CryptoRng, RngCore};
use tracing::{debug, instrument, trace};

use crate::{
    cipher::{encrypt_row, CipherError, KeyPair},
    circuit::Circuit,
    garbled::{GarbledCircuit, GarbledTable, GateInputs, Wire},
    gate::{Gate, WireLabel},
};

/// Errors that can occur while garbling.
#[derive(Debug, thiserror::Error)]
pub enum GarbleError {
    #[error("wire {0} was assigned two different key pairs")]
    KeyPairMismatch(WireLabel),
    #[error("no key pair recorded for wire {0}")]
    MissingKeyPair(WireLabel),
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Output of a garbling run.
///
/// `garbled` holds every input wire as [`Wire::Pending`]; the garbler fixes
/// its own inputs and withholds the evaluator's before sending it.
/// `key_pairs` is the garbler's private record of every wire's keys.
#[derive(Debug, Clone)]
pub struct Garbling {
    pub garbled: GarbledCircuit,
    pub sink_pair: KeyPair,
    pub key_pairs: BTreeMap<WireLabel, KeyPair>,
}

impl Garbling {
    /// Key pair of an external input wire.
    pub fn input_pair(&self, wire: WireLabel) -> Option<KeyPair> {
        match self.garbled.wire(wire) {
            Some(Wire::Unresolved { .. }) | None => None,
            Some(_) => self.key_pairs.get(&wire).copied(),
        }
    }
}

/// Garbles `circuit`.
///
/// The circuit is walked breadth first from the sink towards its inputs. The
/// sink carries the public clear markers; every other wire gets a fresh random
/// pair the first time it is reached, and keeps that pair for every gate it
/// feeds.
#[instrument(level = "debug", skip_all, err)]
pub fn garble<R: RngCore + CryptoRng>(
    circuit: &Circuit,
    rng: &mut R,
) -> Result<Garbling, GarbleError> {
    let sink = circuit.sink();
    let sink_pair = KeyPair::clear_markers();

    let mut garbled = GarbledCircuit::new(sink);
    let mut key_pairs = BTreeMap::from([(sink, sink_pair)]);
    let mut garbled_outputs = BTreeMap::new();
    let mut visited = BTreeSet::from([sink]);
    let mut frontier = BinaryHeap::from([Reverse((0usize, sink))]);

    while let Some(Reverse((level, wire))) = frontier.pop() {
        let pair = *key_pairs
            .get(&wire)
            .ok_or(GarbleError::MissingKeyPair(wire))?;

        let Some(gate) = circuit.gate(wire) else {
            trace!(%wire, level, "reached input wire");
            garbled.insert(wire, Wire::Pending(pair));
            continue;
        };

        if !record_output(&mut garbled_outputs, wire, pair)? {
            continue;
        }

        for input in gate.inputs() {
            key_pairs
                .entry(input)
                .or_insert_with(|| KeyPair::random(rng));
        }

        let table = garble_gate(gate, &key_pairs, rng)?;
        trace!(%wire, level, kind = %gate.kind, rows = table.len(), "garbled gate");
        garbled.insert(
            wire,
            Wire::Unresolved {
                inputs: GateInputs {
                    input1: gate.input1,
                    input2: gate.input2,
                },
                table,
            },
        );

        for input in gate.inputs() {
            if visited.insert(input) {
                frontier.push(Reverse((level + 1, input)));
            }
        }
    }

    debug!(wires = garbled.wires().count(), "garbled circuit");

    Ok(Garbling {
        garbled,
        sink_pair,
        key_pairs,
    })
}

/// Records `pair` as the output pair of a garbled gate.
///
/// Returns `false` if the gate was already garbled with the same pair, and
/// an error if it was garbled with a different one.
fn record_output(
    garbled_outputs: &mut BTreeMap<WireLabel, KeyPair>,
    wire: WireLabel,
    pair: KeyPair,
) -> Result<bool, GarbleError> {
    match garbled_outputs.get(&wire) {
        Some(recorded) if *recorded != pair => Err(GarbleError::KeyPairMismatch(wire)),
        Some(_) => Ok(false),
        None => {
            garbled_outputs.insert(wire, pair);
            Ok(true)
        }
    }
}

/// Encrypts the truth table of `gate` and shuffles its rows.
pub(crate) fn garble_gate<R: RngCore + CryptoRng>(
    gate: &Gate,
    key_pairs: &BTreeMap<WireLabel, KeyPair>,
    rng: &mut R,
) -> Result<GarbledTable, GarbleError> {
    let pair = |wire: WireLabel| {
        key_pairs
            .get(&wire)
            .copied()
            .ok_or(GarbleError::MissingKeyPair(wire))
    };

    let pair_a = pair(gate.input1)?;
    let pair_b = gate.input2.map(pair).transpose()?;
    let pair_c = pair(gate.output)?;

    let mut rows = Vec::with_capacity(gate.truth_table().len());
    for &(a, b, c) in gate.truth_table() {
        let key_a = pair_a.select(a);
        let key_b = match (pair_b, b) {
            (Some(pair_b), Some(b)) => Some(pair_b.select(b)),
            _ => None,
        };
        let key_c = pair_c.select(c);
        rows.push(encrypt_row(rng, &key_a, key_b.as_ref(), &key_c)?);
    }

    // Row order must not reveal which row is which.
    rows.shuffle(rng);

    Ok(GarbledTable::new(rows))
}
