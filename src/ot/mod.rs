//! Oblivious transfer of wire keys.
//!
//! The engine only relies on the two-message contract described by
//! [`OtSender`] and [`OtReceiver`]. Wire keys are longer than one transfer
//! unit, so each key is split into [`OT_UNIT_LEN`] byte chunks and every chunk
//! travels in its own OT instance.

mod rsa;

pub use self::rsa::{PublicParams, Query, Response, RsaOtReceiver, RsaOtSender, DEFAULT_MODULUS_BITS};

use std::collections::BTreeMap;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cipher::{Key, KeyPair, KEY_LEN},
    gate::WireLabel,
};

/// Number of bytes carried by a single OT instance.
pub const OT_UNIT_LEN: usize = 16;

const _: () = assert!(KEY_LEN % OT_UNIT_LEN == 0);

/// The payload of one OT instance.
pub type Chunk = [u8; OT_UNIT_LEN];

#[derive(Debug, thiserror::Error)]
pub enum OtError {
    #[error("secret of {0} bytes is not a multiple of the {OT_UNIT_LEN} byte transfer unit")]
    UnalignedSecret(usize),
    #[error("expected {expected} {what}, got {actual}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("choice {choice} is out of range for {count} secrets")]
    ChoiceOutOfRange { choice: usize, count: usize },
    #[error("query element is not reduced modulo the public modulus")]
    InvalidQuery,
    #[error("{0} called out of order")]
    OutOfOrder(&'static str),
    #[error(transparent)]
    Rsa(#[from] ::rsa::Error),
}

/// Sending side of a batch of 1-of-n oblivious transfers.
pub trait OtSender {
    type Params;
    type Query;
    type Response;

    /// Commits to the secrets of every instance without revealing them.
    fn setup<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        instances: Vec<Vec<Chunk>>,
    ) -> Result<Self::Params, OtError>;

    /// Answers the receiver's query obliviously over all secrets.
    fn transfer(&mut self, query: &Self::Query) -> Result<Self::Response, OtError>;
}

/// Receiving side of a batch of 1-of-n oblivious transfers.
pub trait OtReceiver {
    type Params;
    type Query;
    type Response;

    /// Encodes one choice per instance.
    fn query<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        params: &Self::Params,
        choices: &[usize],
    ) -> Result<Self::Query, OtError>;

    /// Recovers the chosen secret of every instance.
    fn resolve(&mut self, response: &Self::Response) -> Result<Vec<Chunk>, OtError>;
}

/// Splits a secret into transfer units.
pub fn split(secret: &[u8]) -> Result<Vec<Chunk>, OtError> {
    if secret.len() % OT_UNIT_LEN != 0 {
        return Err(OtError::UnalignedSecret(secret.len()));
    }
    Ok(secret
        .chunks_exact(OT_UNIT_LEN)
        .map(|chunk| {
            let mut unit = [0u8; OT_UNIT_LEN];
            unit.copy_from_slice(chunk);
            unit
        })
        .collect())
}

/// Joins transfer units back into a secret of `len` bytes.
pub fn join(chunks: &[Chunk], len: usize) -> Result<Vec<u8>, OtError> {
    let mut secret = chunks.concat();
    if secret.len() < len {
        return Err(OtError::CountMismatch {
            what: "secret bytes",
            expected: len,
            actual: secret.len(),
        });
    }
    secret.truncate(len);
    Ok(secret)
}

/// How evaluator-owned wires are bundled into OT instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// One 1-of-2 transfer per wire.
    #[default]
    PerBit,
    /// One 1-of-4 transfer per two consecutive wires.
    Pairs,
}

impl Grouping {
    fn width(&self) -> usize {
        match self {
            Grouping::PerBit => 1,
            Grouping::Pairs => 2,
        }
    }
}

const CHUNKS_PER_KEY: usize = KEY_LEN / OT_UNIT_LEN;

/// Garbler side of wire key delivery.
pub struct KeySender<S> {
    ot: S,
}

impl<S: OtSender> KeySender<S> {
    /// Commits to the key pairs of the evaluator's wires, in order.
    pub fn setup<R: RngCore + CryptoRng>(
        mut ot: S,
        rng: &mut R,
        pairs: &[(WireLabel, KeyPair)],
        grouping: Grouping,
    ) -> Result<(Self, S::Params), OtError> {
        let mut instances = Vec::new();
        for group in pairs.chunks(grouping.width()) {
            let width = group.len();
            let candidates = (0..1usize << width)
                .map(|choice| {
                    let secret = group
                        .iter()
                        .enumerate()
                        .flat_map(|(k, (_, pair))| {
                            *pair.select(bit_of(choice, k, width)).as_bytes()
                        })
                        .collect::<Vec<u8>>();
                    split(&secret)
                })
                .collect::<Result<Vec<_>, _>>()?;

            for c in 0..width * CHUNKS_PER_KEY {
                instances.push(candidates.iter().map(|chunks| chunks[c]).collect());
            }
        }

        debug!(
            wires = pairs.len(),
            instances = instances.len(),
            ?grouping,
            "set up key delivery"
        );

        let params = ot.setup(rng, instances)?;
        Ok((Self { ot }, params))
    }

    pub fn transfer(&mut self, query: &S::Query) -> Result<S::Response, OtError> {
        self.ot.transfer(query)
    }
}

/// Evaluator side of wire key delivery.
pub struct KeyReceiver<R> {
    ot: R,
    wires: Vec<WireLabel>,
    grouping: Grouping,
}

impl<T: OtReceiver> KeyReceiver<T> {
    /// Queries the keys for the evaluator's input bits, in the same wire order
    /// the garbler used.
    pub fn query<R: RngCore + CryptoRng>(
        mut ot: T,
        rng: &mut R,
        params: &T::Params,
        inputs: &[(WireLabel, bool)],
        grouping: Grouping,
    ) -> Result<(Self, T::Query), OtError> {
        let mut choices = Vec::new();
        for group in inputs.chunks(grouping.width()) {
            let choice = group
                .iter()
                .fold(0usize, |choice, (_, bit)| (choice << 1) | *bit as usize);
            choices.extend(std::iter::repeat(choice).take(group.len() * CHUNKS_PER_KEY));
        }

        let query = ot.query(rng, params, &choices)?;
        let wires = inputs.iter().map(|(wire, _)| *wire).collect();
        Ok((
            Self {
                ot,
                wires,
                grouping,
            },
            query,
        ))
    }

    /// Recovers one key per queried wire.
    pub fn resolve(mut self, response: &T::Response) -> Result<BTreeMap<WireLabel, Key>, OtError> {
        let chunks = self.ot.resolve(response)?;
        let expected = self.wires.len() * CHUNKS_PER_KEY;
        if chunks.len() != expected {
            return Err(OtError::CountMismatch {
                what: "transferred chunks",
                expected,
                actual: chunks.len(),
            });
        }

        let mut keys = BTreeMap::new();
        let mut chunks = chunks.as_slice();
        for group in self.wires.chunks(self.grouping.width()) {
            let (head, rest) = chunks.split_at(group.len() * CHUNKS_PER_KEY);
            chunks = rest;
            let secret = join(head, group.len() * KEY_LEN)?;
            for (wire, bytes) in group.iter().zip(secret.chunks_exact(KEY_LEN)) {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(bytes);
                keys.insert(*wire, Key::from_bytes(key));
            }
        }
        Ok(keys)
    }
}

/// Bit of wire `k` (most significant first) within a group choice.
fn bit_of(choice: usize, k: usize, width: usize) -> bool {
    (choice >> (width - 1 - k)) & 1 == 1
}
