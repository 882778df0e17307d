//! Two-party secure computation with Yao's garbled circuits.
//!
//! The garbler [`garble`]s a [`Circuit`], fixes the keys for its own inputs
//! and hands the evaluator the keys for the evaluator's inputs through
//! oblivious transfer ([`ot`]). The evaluator then resolves the sink wire with
//! an [`Evaluator`] and learns the output bit, and nothing else.

use std::collections::BTreeMap;

pub mod cipher;
pub mod circuit;
pub mod evaluate;
pub mod garble;
pub mod garbled;
pub mod gate;
pub mod io;
pub mod ot;
pub mod protocol;

pub use cipher::{Key, KeyPair};
pub use circuit::{Circuit, CircuitError};
pub use evaluate::{EvaluateError, Evaluator};
pub use garble::{garble, GarbleError, Garbling};
pub use garbled::{GarbledCircuit, GarbledTable, Wire};
pub use gate::{Gate, GateKind, WireLabel};
pub use protocol::{EvaluatorSession, GarblerSession, ProtocolError, SessionConfig};

/// Constructs the 2-bit comparator, which outputs 1 iff `a < b`.
///
/// Inputs are `a1 = 0`, `a0 = 1`, `b1 = 2`, `b0 = 3`; the output is wire 12.
pub fn comparator_circuit() -> Result<Circuit, CircuitError> {
    let gates = [
        Gate::not(0, 4),
        Gate::and(2, 4, 5), // b1 & !a1
        Gate::and(3, 2, 6),
        Gate::not(1, 7),
        Gate::and(6, 7, 8), // b0 & b1 & !a0
        Gate::and(4, 7, 9),
        Gate::and(9, 3, 10), // !a1 & !a0 & b0
        Gate::or(5, 8, 11),
        Gate::or(11, 10, 12),
    ];
    Circuit::build(gates)
}

/// Splits the comparator operands into the garbler's (`a`) and the
/// evaluator's (`b`) input bits.
pub fn comparator_inputs(
    a: usize,
    b: usize,
) -> (BTreeMap<WireLabel, bool>, BTreeMap<WireLabel, bool>) {
    let assign = |value: usize, first: usize| {
        decompose(value, 2)
            .into_iter()
            .enumerate()
            .map(|(i, bit)| (WireLabel(first + i), bit))
            .collect()
    };
    (assign(a, 0), assign(b, 2))
}

/// Constructs a new millionaires circuit (e.g. a >= b)
/// for some bit-width n
///
/// The circuit performs:
///
/// (a_0 > b_0) | ((a_0 == b_0) & (a_1 > b_1)
///             | ...
///             | ((a_0 == b_0) & ... & (a_n-2 == b_n-2) & (a_n-1 >= b_n-1)
///
/// where a_i is the ith bit of a, most significant first. Bits of `a` are
/// wires `0..n`, bits of `b` are wires `n..2n`.
pub fn millionaires_circuit(n: usize) -> Result<Circuit, CircuitError> {
    if n == 0 {
        return Err(CircuitError::MalformedCircuit(
            "millionaires circuit needs at least one bit".into(),
        ));
    }

    let mut builder = Builder {
        gates: vec![],
        next: 2 * n,
    };

    let mut prefix = None;
    let mut terms = vec![];
    for i in 0..n {
        let (a, b) = (i, n + i);
        let not_b = builder.not(b);
        let cmp = if i < n - 1 {
            builder.binary(GateKind::And, a, not_b)
        } else {
            builder.binary(GateKind::Or, a, not_b)
        };
        terms.push(match prefix {
            Some(prefix) => builder.binary(GateKind::And, prefix, cmp),
            None => cmp,
        });

        if i < n - 1 {
            let eq = builder.binary(GateKind::Xnor, a, b);
            prefix = Some(match prefix {
                Some(prefix) => builder.binary(GateKind::And, prefix, eq),
                None => eq,
            });
        }
    }

    let _sink = terms
        .into_iter()
        .reduce(|acc, term| builder.binary(GateKind::Or, acc, term));

    Circuit::build(builder.gates)
}

struct Builder {
    gates: Vec<Gate>,
    next: usize,
}

impl Builder {
    fn alloc(&mut self) -> usize {
        self.next += 1;
        self.next - 1
    }

    fn not(&mut self, a: usize) -> usize {
        let out = self.alloc();
        self.gates.push(Gate::not(a, out));
        out
    }

    fn binary(&mut self, kind: GateKind, a: usize, b: usize) -> usize {
        let out = self.alloc();
        self.gates.push(Gate {
            kind,
            input1: WireLabel(a),
            input2: Some(WireLabel(b)),
            output: WireLabel(out),
        });
        out
    }
}

/// Helper function that decomposes a value into n bits, most significant first
pub fn decompose(value: usize, n: u32) -> Vec<bool> {
    (0..n).rev().map(|i| (value >> i) & 1 == 1).collect()
}
