use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::debug;

use crate::gate::{Gate, GateKind, WireLabel};

/// Errors raised while building or evaluating a circuit in the clear.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError {
    #[error("unsupported gate kind: {0}")]
    UnsupportedGateKind(String),
    #[error("{kind} gate with output {output} has {inputs} input(s)")]
    MalformedGate {
        output: WireLabel,
        kind: GateKind,
        inputs: usize,
    },
    #[error("malformed circuit: {0}")]
    MalformedCircuit(String),
    #[error("no value supplied for input wire {0}")]
    MissingInput(WireLabel),
    #[error("invalid circuit description: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A gate descriptor as it appears in a circuit file, type still unparsed.
#[derive(Deserialize)]
struct GateDescriptor {
    #[serde(rename = "type")]
    kind: String,
    input1: WireLabel,
    #[serde(default)]
    input2: Option<WireLabel>,
    output: WireLabel,
}

/// Represents the circuit we want to garble
///
/// Gates are keyed by their output wire. A circuit has exactly one sink, the
/// wire which is some gate's output but never any gate's input.
#[derive(Debug, Clone)]
pub struct Circuit {
    gates: BTreeMap<WireLabel, Gate>,
    input_wires: BTreeSet<WireLabel>,
    sink: WireLabel,
}

impl Circuit {
    /// Builds a circuit from a list of gates.
    pub fn build(gates: impl IntoIterator<Item = Gate>) -> Result<Self, CircuitError> {
        let mut by_output = BTreeMap::new();
        let mut input_wires = BTreeSet::new();

        for gate in gates {
            gate.check_arity()?;
            input_wires.extend(gate.inputs());
            match by_output.entry(gate.output) {
                Entry::Vacant(entry) => {
                    entry.insert(gate);
                }
                Entry::Occupied(entry) => {
                    return Err(CircuitError::MalformedCircuit(format!(
                        "wire {} is the output of more than one gate",
                        entry.key()
                    )))
                }
            }
        }

        if by_output.is_empty() {
            return Err(CircuitError::MalformedCircuit("circuit has no gates".into()));
        }

        let sinks = by_output
            .keys()
            .filter(|wire| !input_wires.contains(wire))
            .copied()
            .collect::<Vec<_>>();
        let sink = match sinks.as_slice() {
            [sink] => *sink,
            _ => {
                return Err(CircuitError::MalformedCircuit(format!(
                    "expected exactly one sink wire, found {sinks:?}"
                )))
            }
        };

        input_wires.retain(|wire| !by_output.contains_key(wire));

        debug!(
            gates = by_output.len(),
            inputs = input_wires.len(),
            %sink,
            "built circuit"
        );

        Ok(Self {
            gates: by_output,
            input_wires,
            sink,
        })
    }

    /// Parses a JSON list of gate descriptors and builds the circuit.
    ///
    /// Gate types are matched after parsing, so an unknown type is reported
    /// as [`CircuitError::UnsupportedGateKind`] rather than a parse error.
    pub fn from_json(json: &str) -> Result<Self, CircuitError> {
        let descriptors: Vec<GateDescriptor> = serde_json::from_str(json)?;
        let gates = descriptors
            .into_iter()
            .map(|d| Gate::new(d.kind.parse()?, d.input1, d.input2, d.output))
            .collect::<Result<Vec<_>, _>>()?;
        Self::build(gates)
    }

    /// Returns the gate whose output is `wire`, if any.
    pub fn gate(&self, wire: WireLabel) -> Option<&Gate> {
        self.gates.get(&wire)
    }

    pub fn gates(&self) -> impl Iterator<Item = &Gate> {
        self.gates.values()
    }

    /// Wires which are inputs to the circuit as a whole.
    pub fn input_wires(&self) -> &BTreeSet<WireLabel> {
        &self.input_wires
    }

    /// Wires driven by some gate.
    pub fn output_wires(&self) -> impl Iterator<Item = WireLabel> + '_ {
        self.gates.keys().copied()
    }

    pub fn sink(&self) -> WireLabel {
        self.sink
    }

    /// Evaluates the circuit in the clear.
    ///
    /// This is the plaintext reference the garbled evaluation must agree with.
    pub fn evaluate_clear(&self, inputs: &BTreeMap<WireLabel, bool>) -> Result<bool, CircuitError> {
        let mut values: BTreeMap<WireLabel, bool> = BTreeMap::new();
        // Gates whose inputs are still being evaluated.
        let mut expanding = BTreeSet::new();
        let mut stack = vec![self.sink];

        while let Some(&wire) = stack.last() {
            if values.contains_key(&wire) {
                stack.pop();
                continue;
            }

            let Some(gate) = self.gates.get(&wire) else {
                let value = inputs
                    .get(&wire)
                    .copied()
                    .ok_or(CircuitError::MissingInput(wire))?;
                values.insert(wire, value);
                stack.pop();
                continue;
            };

            if expanding.insert(wire) {
                let mut pending = false;
                for input in gate.inputs() {
                    if values.contains_key(&input) {
                        continue;
                    }
                    if expanding.contains(&input) {
                        return Err(CircuitError::MalformedCircuit(format!(
                            "cycle through wire {input}"
                        )));
                    }
                    stack.push(input);
                    pending = true;
                }
                if pending {
                    continue;
                }
            }

            let value = |input: WireLabel| {
                values
                    .get(&input)
                    .copied()
                    .ok_or(CircuitError::MissingInput(input))
            };
            let a = value(gate.input1)?;
            let b = gate.input2.map(value).transpose()?;
            let c = gate.kind.apply(a, b).ok_or_else(|| {
                CircuitError::MalformedCircuit(format!("gate {wire} has no matching truth table row"))
            })?;
            expanding.remove(&wire);
            values.insert(wire, c);
            stack.pop();
        }

        values
            .get(&self.sink)
            .copied()
            .ok_or(CircuitError::MissingInput(self.sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator_circuit;

    #[test]
    fn derives_inputs_and_sink() {
        let circuit = comparator_circuit().unwrap();
        assert_eq!(
            circuit.input_wires().iter().copied().collect::<Vec<_>>(),
            (0..4).map(WireLabel).collect::<Vec<_>>()
        );
        assert_eq!(circuit.sink(), WireLabel(12));
        assert_eq!(circuit.output_wires().count(), 9);
    }

    #[test]
    fn rejects_multiple_sinks() {
        let err = Circuit::build([Gate::and(0, 1, 2), Gate::or(0, 1, 3)]).unwrap_err();
        assert!(matches!(err, CircuitError::MalformedCircuit(_)));
    }

    #[test]
    fn rejects_cycle_without_sink() {
        let err = Circuit::build([Gate::and(0, 3, 2), Gate::or(2, 1, 3)]).unwrap_err();
        assert!(matches!(err, CircuitError::MalformedCircuit(_)));
    }

    #[test]
    fn rejects_duplicate_outputs_and_empty() {
        let err = Circuit::build([Gate::and(0, 1, 2), Gate::or(0, 1, 2)]).unwrap_err();
        assert!(matches!(err, CircuitError::MalformedCircuit(_)));

        let err = Circuit::build([]).unwrap_err();
        assert!(matches!(err, CircuitError::MalformedCircuit(_)));
    }

    #[test]
    fn fan_out_is_legal() {
        let circuit = Circuit::build([
            Gate::not(0, 2),
            Gate::and(2, 1, 3),
            Gate::xor(2, 3, 4),
        ])
        .unwrap();
        assert_eq!(circuit.sink(), WireLabel(4));
        assert_eq!(circuit.input_wires().len(), 2);
    }

    #[test]
    fn from_json_descriptors() {
        let circuit = Circuit::from_json(
            r#"[
                {"type": "NOT", "input1": 0, "output": 2},
                {"type": "AND", "input1": 2, "input2": 1, "output": 3}
            ]"#,
        )
        .unwrap();
        assert_eq!(circuit.sink(), WireLabel(3));

        let err = Circuit::from_json(r#"[{"type": "NAND", "input1": 0, "input2": 1, "output": 2}]"#)
            .unwrap_err();
        assert!(matches!(err, CircuitError::UnsupportedGateKind(kind) if kind == "NAND"));

        let err = Circuit::from_json(r#"[{"type": "NOT", "input1": 0, "input2": 1, "output": 2}]"#)
            .unwrap_err();
        assert!(matches!(err, CircuitError::MalformedGate { inputs: 2, .. }));

        let err = Circuit::from_json(r#"[{"type": "AND", "input1": 0}]"#).unwrap_err();
        assert!(matches!(err, CircuitError::Parse(_)));
    }

    #[test]
    fn clear_evaluation_of_deep_fan_out() {
        // Every gate from 4 on reads the two gates before it.
        let mut gates = vec![Gate::and(0, 1, 2), Gate::xor(0, 1, 3)];
        gates.extend((4..12).map(|k| Gate::or(k - 2, k - 1, k)));
        let circuit = Circuit::build(gates).unwrap();
        assert_eq!(circuit.sink(), WireLabel(11));

        for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
            let inputs = BTreeMap::from([(WireLabel(0), a), (WireLabel(1), b)]);
            assert_eq!(circuit.evaluate_clear(&inputs).unwrap(), a | b, "{a} {b}");
        }
    }

    #[test]
    fn clear_evaluation_detects_cycle_below_sink() {
        let circuit = Circuit::build([
            Gate::and(0, 3, 2),
            Gate::or(2, 1, 3),
            Gate::not(2, 4),
        ])
        .unwrap();
        assert_eq!(circuit.sink(), WireLabel(4));

        let inputs = BTreeMap::from([(WireLabel(0), true), (WireLabel(1), false)]);
        let err = circuit.evaluate_clear(&inputs).unwrap_err();
        assert!(matches!(err, CircuitError::MalformedCircuit(_)));
    }

    #[test]
    fn clear_evaluation_needs_every_input() {
        let circuit = Circuit::build([Gate::and(0, 1, 2)]).unwrap();
        let inputs = BTreeMap::from([(WireLabel(0), true)]);
        let err = circuit.evaluate_clear(&inputs).unwrap_err();
        assert!(matches!(err, CircuitError::MissingInput(WireLabel(1))));

        let inputs = BTreeMap::from([(WireLabel(0), true), (WireLabel(1), true)]);
        assert!(circuit.evaluate_clear(&inputs).unwrap());
    }
}
