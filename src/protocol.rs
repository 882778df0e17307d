//! The three-message two-party session.
//!
//! 1. garbler -> evaluator: OT public parameters
//! 2. evaluator -> garbler: OT query
//! 3. garbler -> evaluator: OT response and the garbled circuit
//!
//! After the third message the evaluator computes the output locally.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{Read, Write},
};

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    circuit::Circuit,
    evaluate::{EvaluateError, Evaluator},
    garble::{garble, GarbleError},
    garbled::{FormatError, GarbledCircuit},
    gate::WireLabel,
    io::{recv_message, send_message, FramingError},
    ot::{
        Grouping, KeyReceiver, KeySender, OtError, PublicParams, Query, Response, RsaOtReceiver,
        RsaOtSender, DEFAULT_MODULUS_BITS,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("input wire {0} must be owned by exactly one party")]
    InputAssignment(WireLabel),
    #[error(transparent)]
    Garble(#[from] GarbleError),
    #[error(transparent)]
    Evaluate(#[from] EvaluateError),
    #[error(transparent)]
    Ot(#[from] OtError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("invalid garbled circuit: {0}")]
    Format(#[from] FormatError),
}

/// Settings shared by both sides of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Modulus size of the garbler's OT key.
    pub rsa_bits: usize,
    /// Largest message either side accepts.
    pub max_frame_len: usize,
    /// How evaluator wires are bundled into OT instances.
    pub grouping: Grouping,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rsa_bits: DEFAULT_MODULUS_BITS,
            max_frame_len: 16 << 20,
            grouping: Grouping::default(),
        }
    }
}

/// The final message of a session.
#[derive(Serialize, Deserialize)]
struct Delivery {
    response: Response,
    circuit: GarbledCircuit,
}

/// The garbling party.
pub struct GarblerSession<'a> {
    circuit: &'a Circuit,
    config: SessionConfig,
}

impl<'a> GarblerSession<'a> {
    pub fn new(circuit: &'a Circuit, config: SessionConfig) -> Self {
        Self { circuit, config }
    }

    /// Runs the garbler's side of one session.
    ///
    /// `inputs` holds the garbler's own input bits; every other input wire of
    /// the circuit must be listed in `evaluator_wires`.
    #[instrument(level = "debug", skip_all, err)]
    pub fn run<S: Read + Write, R: RngCore + CryptoRng>(
        &self,
        stream: &mut S,
        rng: &mut R,
        inputs: &BTreeMap<WireLabel, bool>,
        evaluator_wires: &BTreeSet<WireLabel>,
    ) -> Result<(), ProtocolError> {
        for &wire in self.circuit.input_wires() {
            if inputs.contains_key(&wire) == evaluator_wires.contains(&wire) {
                return Err(ProtocolError::InputAssignment(wire));
            }
        }
        if let Some(&wire) = inputs
            .keys()
            .chain(evaluator_wires)
            .find(|wire| !self.circuit.input_wires().contains(*wire))
        {
            return Err(ProtocolError::InputAssignment(wire));
        }

        let mut garbled = garble(self.circuit, rng)?.garbled;
        for (&wire, &bit) in inputs {
            garbled
                .choose_input(wire, bit)
                .ok_or(ProtocolError::InputAssignment(wire))?;
        }
        let pairs = evaluator_wires
            .iter()
            .map(|&wire| {
                garbled
                    .withhold_input(wire)
                    .map(|pair| (wire, pair))
                    .ok_or(ProtocolError::InputAssignment(wire))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ot = RsaOtSender::new(rng, self.config.rsa_bits)?;
        let (mut sender, params) = KeySender::setup(ot, rng, &pairs, self.config.grouping)?;
        send_message(stream, &params)?;
        debug!("sent ot parameters");

        let query: Query = recv_message(stream, self.config.max_frame_len)?;
        let response = sender.transfer(&query)?;
        send_message(
            stream,
            &Delivery {
                response,
                circuit: garbled,
            },
        )?;
        info!("sent garbled circuit");

        Ok(())
    }
}

/// The evaluating party.
pub struct EvaluatorSession {
    config: SessionConfig,
}

impl EvaluatorSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Runs the evaluator's side of one session and returns the output bit.
    #[instrument(level = "debug", skip_all, err)]
    pub fn run<S: Read + Write, R: RngCore + CryptoRng>(
        &self,
        stream: &mut S,
        rng: &mut R,
        inputs: &BTreeMap<WireLabel, bool>,
    ) -> Result<bool, ProtocolError> {
        let params: PublicParams = recv_message(stream, self.config.max_frame_len)?;
        let inputs = inputs
            .iter()
            .map(|(wire, bit)| (*wire, *bit))
            .collect::<Vec<_>>();
        let (receiver, query) = KeyReceiver::query(
            RsaOtReceiver::new(),
            rng,
            &params,
            &inputs,
            self.config.grouping,
        )?;
        send_message(stream, &query)?;
        debug!("sent ot query");

        let Delivery {
            response,
            mut circuit,
        } = recv_message(stream, self.config.max_frame_len)?;
        circuit.validate()?;
        let keys = receiver.resolve(&response)?;

        let output = Evaluator::new().evaluate(&mut circuit, &keys)?;
        info!(output, "evaluated garbled circuit");

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{comparator_circuit, comparator_inputs};
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use std::io::Cursor;

    fn config() -> SessionConfig {
        SessionConfig {
            rsa_bits: 512,
            ..Default::default()
        }
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"rsa_bits": 2048, "grouping": "pairs"}"#).unwrap();
        assert_eq!(
            config,
            SessionConfig {
                rsa_bits: 2048,
                grouping: Grouping::Pairs,
                ..Default::default()
            }
        );

        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn rejects_unassigned_inputs() {
        let circuit = comparator_circuit().unwrap();
        let (garbler_inputs, _) = comparator_inputs(1, 2);
        let evaluator_wires = BTreeSet::from([WireLabel(2)]);

        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let err = GarblerSession::new(&circuit, config())
            .run(&mut Cursor::new(Vec::<u8>::new()), &mut rng, &garbler_inputs, &evaluator_wires)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InputAssignment(WireLabel(3))));
    }

    #[test]
    fn rejects_doubly_assigned_inputs() {
        let circuit = comparator_circuit().unwrap();
        let (garbler_inputs, _) = comparator_inputs(1, 2);
        let evaluator_wires = BTreeSet::from([WireLabel(1), WireLabel(2), WireLabel(3)]);

        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let err = GarblerSession::new(&circuit, config())
            .run(&mut Cursor::new(Vec::<u8>::new()), &mut rng, &garbler_inputs, &evaluator_wires)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InputAssignment(WireLabel(1))));
    }

    #[test]
    fn evaluator_fails_on_closed_stream() {
        let mut stream = Cursor::new(Vec::<u8>::new());
        let (_, evaluator_inputs) = comparator_inputs(0, 0);
        let mut rng = ChaCha12Rng::seed_from_u64(2);

        let err = EvaluatorSession::new(config())
            .run(&mut stream, &mut rng, &evaluator_inputs)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Framing(FramingError::Truncated { expected: 4, received: 0 })
        ));
    }
}
