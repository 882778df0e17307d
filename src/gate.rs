//! Boolean gates and their fixed truth tables.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::circuit::CircuitError;

/// The external wire representation.
///
/// Labels are opaque, totally ordered and unique within one circuit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireLabel(pub usize);

impl fmt::Display for WireLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

impl From<usize> for WireLabel {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

/// The boolean operation a gate performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GateKind {
    And,
    Or,
    Xor,
    Xnor,
    Not,
}

/// A truth table row: `(a, b, c)`, where `b` is absent for unary gates.
pub type Row = (bool, Option<bool>, bool);

const AND_TABLE: [Row; 4] = [
    (false, Some(false), false),
    (false, Some(true), false),
    (true, Some(false), false),
    (true, Some(true), true),
];
const OR_TABLE: [Row; 4] = [
    (false, Some(false), false),
    (false, Some(true), true),
    (true, Some(false), true),
    (true, Some(true), true),
];
const XOR_TABLE: [Row; 4] = [
    (false, Some(false), false),
    (false, Some(true), true),
    (true, Some(false), true),
    (true, Some(true), false),
];
const XNOR_TABLE: [Row; 4] = [
    (false, Some(false), true),
    (false, Some(true), false),
    (true, Some(false), false),
    (true, Some(true), true),
];
const NOT_TABLE: [Row; 2] = [(false, None, true), (true, None, false)];

impl GateKind {
    /// Returns the fixed, ordered truth table of this kind.
    pub fn truth_table(&self) -> &'static [Row] {
        match self {
            GateKind::And => &AND_TABLE,
            GateKind::Or => &OR_TABLE,
            GateKind::Xor => &XOR_TABLE,
            GateKind::Xnor => &XNOR_TABLE,
            GateKind::Not => &NOT_TABLE,
        }
    }

    /// Number of input wires the gate takes.
    pub fn arity(&self) -> usize {
        match self {
            GateKind::Not => 1,
            _ => 2,
        }
    }

    /// Evaluates the gate in the clear by table lookup.
    pub fn apply(&self, a: bool, b: Option<bool>) -> Option<bool> {
        self.truth_table()
            .iter()
            .find(|(ra, rb, _)| *ra == a && *rb == b)
            .map(|(_, _, c)| *c)
    }

    fn as_str(&self) -> &'static str {
        match self {
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Xor => "XOR",
            GateKind::Xnor => "XNOR",
            GateKind::Not => "NOT",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateKind {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(GateKind::And),
            "OR" => Ok(GateKind::Or),
            "XOR" => Ok(GateKind::Xor),
            "XNOR" => Ok(GateKind::Xnor),
            "NOT" => Ok(GateKind::Not),
            _ => Err(CircuitError::UnsupportedGateKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for GateKind {
    type Error = CircuitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GateKind> for String {
    fn from(kind: GateKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A gate in the circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    #[serde(rename = "type")]
    pub kind: GateKind,
    pub input1: WireLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input2: Option<WireLabel>,
    pub output: WireLabel,
}

impl Gate {
    /// Creates a gate, checking that the number of inputs matches `kind`.
    pub fn new(
        kind: GateKind,
        input1: WireLabel,
        input2: Option<WireLabel>,
        output: WireLabel,
    ) -> Result<Self, CircuitError> {
        let gate = Self {
            kind,
            input1,
            input2,
            output,
        };
        gate.check_arity()?;
        Ok(gate)
    }

    pub fn and(a: usize, b: usize, out: usize) -> Self {
        Self::binary(GateKind::And, a, b, out)
    }

    pub fn or(a: usize, b: usize, out: usize) -> Self {
        Self::binary(GateKind::Or, a, b, out)
    }

    pub fn xor(a: usize, b: usize, out: usize) -> Self {
        Self::binary(GateKind::Xor, a, b, out)
    }

    pub fn xnor(a: usize, b: usize, out: usize) -> Self {
        Self::binary(GateKind::Xnor, a, b, out)
    }

    pub fn not(a: usize, out: usize) -> Self {
        Self {
            kind: GateKind::Not,
            input1: WireLabel(a),
            input2: None,
            output: WireLabel(out),
        }
    }

    fn binary(kind: GateKind, a: usize, b: usize, out: usize) -> Self {
        Self {
            kind,
            input1: WireLabel(a),
            input2: Some(WireLabel(b)),
            output: WireLabel(out),
        }
    }

    /// Input wires of the gate, `input1` first.
    pub fn inputs(&self) -> impl Iterator<Item = WireLabel> {
        std::iter::once(self.input1).chain(self.input2)
    }

    pub fn truth_table(&self) -> &'static [Row] {
        self.kind.truth_table()
    }

    pub(crate) fn check_arity(&self) -> Result<(), CircuitError> {
        let arity = 1 + self.input2.is_some() as usize;
        if arity != self.kind.arity() {
            return Err(CircuitError::MalformedGate {
                output: self.output,
                kind: self.kind,
                inputs: arity,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(GateKind::And, [false, false, false, true])]
    #[case(GateKind::Or, [false, true, true, true])]
    #[case(GateKind::Xor, [false, true, true, false])]
    #[case(GateKind::Xnor, [true, false, false, true])]
    fn binary_truth_tables(#[case] kind: GateKind, #[case] outputs: [bool; 4]) {
        let table = kind.truth_table();
        assert_eq!(table.len(), 4);
        for (i, (a, b, c)) in table.iter().enumerate() {
            assert_eq!(*a, i & 2 != 0);
            assert_eq!(*b, Some(i & 1 != 0));
            assert_eq!(*c, outputs[i]);
        }
    }

    #[test]
    fn not_truth_table() {
        assert_eq!(
            GateKind::Not.truth_table(),
            &[(false, None, true), (true, None, false)]
        );
        assert_eq!(GateKind::Not.apply(true, None), Some(false));
        assert_eq!(GateKind::Not.apply(true, Some(true)), None);
    }

    #[test]
    fn parses_kinds() {
        assert_eq!("xnor".parse::<GateKind>().unwrap(), GateKind::Xnor);
        let err = "NAND".parse::<GateKind>().unwrap_err();
        assert!(matches!(err, CircuitError::UnsupportedGateKind(kind) if kind == "NAND"));
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = Gate::new(GateKind::And, WireLabel(0), None, WireLabel(1)).unwrap_err();
        assert!(matches!(err, CircuitError::MalformedGate { inputs: 1, .. }));

        let err = Gate::new(GateKind::Not, WireLabel(0), Some(WireLabel(1)), WireLabel(2))
            .unwrap_err();
        assert!(matches!(err, CircuitError::MalformedGate { inputs: 2, .. }));
    }

    #[test]
    fn gate_descriptor_json() {
        let gate: Gate =
            serde_json::from_str(r#"{"type": "AND", "input1": 2, "input2": 4, "output": 5}"#)
                .unwrap();
        assert_eq!(gate, Gate::and(2, 4, 5));

        let gate: Gate = serde_json::from_str(r#"{"type": "NOT", "input1": 0, "output": 4}"#)
            .unwrap();
        assert_eq!(gate, Gate::not(0, 4));

        assert!(
            serde_json::from_str::<Gate>(r#"{"type": "NOR", "input1": 0, "input2": 1, "output": 4}"#)
                .is_err()
        );
    }
}
