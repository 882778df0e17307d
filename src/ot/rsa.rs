//! RSA-blinded 1-of-n oblivious transfer.
//!
//! The sender publishes its public key `(N, e)` and, per instance, random
//! values `x_0..x_n`. To choose `b` the receiver picks a random `k` and sends
//! `v = x_b + k^e mod N`. The sender masks every secret with a key derived
//! from `(v - x_i)^d mod N`; only for `i = b` does that equal `k`, so the
//! receiver can unmask exactly one secret while `v` looks uniform to the
//! sender.

use ::rsa::{
    traits::{PrivateKeyParts, PublicKeyParts},
    BigUint, RsaPrivateKey, RsaPublicKey,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use sha2::{Digest, Sha256};
use tracing::trace;

use super::{Chunk, OtError, OtReceiver, OtSender, OT_UNIT_LEN};

/// Modulus size used when none is configured.
pub const DEFAULT_MODULUS_BITS: usize = 1024;

/// First message: the sender's public key and blinding values.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicParams {
    #[serde_as(as = "Base64")]
    n: Vec<u8>,
    #[serde_as(as = "Base64")]
    e: Vec<u8>,
    #[serde_as(as = "Vec<Vec<Base64>>")]
    xs: Vec<Vec<Vec<u8>>>,
}

/// Second message: one blinded choice per instance.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    #[serde_as(as = "Vec<Base64>")]
    vs: Vec<Vec<u8>>,
}

/// Third message: every secret of every instance, masked.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde_as(as = "Vec<Vec<Base64>>")]
    masked: Vec<Vec<Chunk>>,
}

/// Sender of the RSA-blinded OT.
pub struct RsaOtSender {
    key: RsaPrivateKey,
    secrets: Vec<Vec<Chunk>>,
    xs: Vec<Vec<BigUint>>,
}

impl RsaOtSender {
    /// Generates a fresh RSA key of `bits` bits.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> Result<Self, OtError> {
        let key = RsaPrivateKey::new(rng, bits)?;
        Ok(Self {
            key,
            secrets: Vec::new(),
            xs: Vec::new(),
        })
    }
}

impl OtSender for RsaOtSender {
    type Params = PublicParams;
    type Query = Query;
    type Response = Response;

    fn setup<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        instances: Vec<Vec<Chunk>>,
    ) -> Result<PublicParams, OtError> {
        let n = self.key.n();
        self.xs = instances
            .iter()
            .map(|secrets| secrets.iter().map(|_| random_below(rng, n)).collect())
            .collect();
        self.secrets = instances;

        Ok(PublicParams {
            n: n.to_bytes_be(),
            e: self.key.e().to_bytes_be(),
            xs: self
                .xs
                .iter()
                .map(|xs| xs.iter().map(BigUint::to_bytes_be).collect())
                .collect(),
        })
    }

    fn transfer(&mut self, query: &Query) -> Result<Response, OtError> {
        if self.secrets.is_empty() && !query.vs.is_empty() {
            return Err(OtError::OutOfOrder("transfer"));
        }
        if query.vs.len() != self.secrets.len() {
            return Err(OtError::CountMismatch {
                what: "query elements",
                expected: self.secrets.len(),
                actual: query.vs.len(),
            });
        }

        let n = self.key.n();
        let d = self.key.d();
        let mut masked = Vec::with_capacity(self.secrets.len());
        for (instance, ((secrets, xs), v)) in self
            .secrets
            .iter()
            .zip(&self.xs)
            .zip(&query.vs)
            .enumerate()
        {
            let v = BigUint::from_bytes_be(v);
            if &v >= n {
                return Err(OtError::InvalidQuery);
            }
            masked.push(
                secrets
                    .iter()
                    .zip(xs)
                    .map(|(secret, x)| {
                        let k = ((&v + n) - x) % n;
                        xor(secret, &mask(instance, &k.modpow(d, n)))
                    })
                    .collect(),
            );
        }

        trace!(instances = masked.len(), "answered ot query");
        Ok(Response { masked })
    }
}

/// Receiver of the RSA-blinded OT.
#[derive(Default)]
pub struct RsaOtReceiver {
    state: Option<Vec<(usize, BigUint)>>,
}

impl RsaOtReceiver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OtReceiver for RsaOtReceiver {
    type Params = PublicParams;
    type Query = Query;
    type Response = Response;

    fn query<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        params: &PublicParams,
        choices: &[usize],
    ) -> Result<Query, OtError> {
        if choices.len() != params.xs.len() {
            return Err(OtError::CountMismatch {
                what: "choices",
                expected: params.xs.len(),
                actual: choices.len(),
            });
        }

        // Validates the modulus and exponent.
        let public = RsaPublicKey::new(
            BigUint::from_bytes_be(&params.n),
            BigUint::from_bytes_be(&params.e),
        )?;
        let (n, e) = (public.n(), public.e());

        let mut state = Vec::with_capacity(choices.len());
        let mut vs = Vec::with_capacity(choices.len());
        for (&choice, xs) in choices.iter().zip(&params.xs) {
            let x = xs.get(choice).ok_or(OtError::ChoiceOutOfRange {
                choice,
                count: xs.len(),
            })?;
            let k = random_below(rng, n);
            let v = (BigUint::from_bytes_be(x) + k.modpow(e, n)) % n;
            vs.push(v.to_bytes_be());
            state.push((choice, k));
        }

        self.state = Some(state);
        Ok(Query { vs })
    }

    fn resolve(&mut self, response: &Response) -> Result<Vec<Chunk>, OtError> {
        let state = self.state.take().ok_or(OtError::OutOfOrder("resolve"))?;
        if response.masked.len() != state.len() {
            return Err(OtError::CountMismatch {
                what: "masked instances",
                expected: state.len(),
                actual: response.masked.len(),
            });
        }

        state
            .iter()
            .zip(&response.masked)
            .enumerate()
            .map(|(instance, ((choice, k), masked))| {
                let secret = masked.get(*choice).ok_or(OtError::ChoiceOutOfRange {
                    choice: *choice,
                    count: masked.len(),
                })?;
                Ok(xor(secret, &mask(instance, k)))
            })
            .collect()
    }
}

/// Samples a value in `[0, n)`, drawing 64 extra bits to keep the bias negligible.
fn random_below<R: RngCore + CryptoRng>(rng: &mut R, n: &BigUint) -> BigUint {
    let mut bytes = vec![0u8; (n.bits() + 7) / 8 + 8];
    rng.fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes) % n
}

/// Derives the mask for one instance from its unblinded value.
fn mask(instance: usize, k: &BigUint) -> Chunk {
    let digest = Sha256::new()
        .chain_update((instance as u64).to_be_bytes())
        .chain_update(k.to_bytes_be())
        .finalize();
    let mut mask = [0u8; OT_UNIT_LEN];
    mask.copy_from_slice(&digest[..OT_UNIT_LEN]);
    mask
}

fn xor(a: &Chunk, b: &Chunk) -> Chunk {
    let mut out = [0u8; OT_UNIT_LEN];
    for (byte, (a, b)) in out.iter_mut().zip(a.iter().zip(b)) {
        *byte = a ^ b;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;

    const BITS: usize = 512;

    fn secrets(rng: &mut ChaCha12Rng, count: usize) -> Vec<Chunk> {
        (0..count).map(|_| rng.gen()).collect()
    }

    #[test]
    fn receiver_gets_the_queried_secret() {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let mut sender = RsaOtSender::new(&mut rng, BITS).unwrap();

        for _ in 0..50 {
            let count = rng.gen_range(2..=4);
            let instances = vec![secrets(&mut rng, count), secrets(&mut rng, count)];
            let choices = [rng.gen_range(0..count), rng.gen_range(0..count)];

            let params = sender.setup(&mut rng, instances.clone()).unwrap();
            let mut receiver = RsaOtReceiver::new();
            let query = receiver.query(&mut rng, &params, &choices).unwrap();
            let response = sender.transfer(&query).unwrap();
            let received = receiver.resolve(&response).unwrap();

            assert_eq!(received, vec![instances[0][choices[0]], instances[1][choices[1]]]);
        }
    }

    #[test]
    fn query_distribution_does_not_depend_on_choice() {
        const TRIALS: usize = 200;

        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let mut sender = RsaOtSender::new(&mut rng, BITS).unwrap();
        let half = sender.key.n() >> 1usize;

        let mut low = [0usize; 2];
        for choice in [0, 1] {
            for _ in 0..TRIALS {
                let instance = secrets(&mut rng, 2);
                let params = sender.setup(&mut rng, vec![instance]).unwrap();
                let query = RsaOtReceiver::new()
                    .query(&mut rng, &params, &[choice])
                    .unwrap();
                if BigUint::from_bytes_be(&query.vs[0]) < half {
                    low[choice] += 1;
                }
            }
        }

        for count in low {
            assert!((70..=130).contains(&count), "{low:?}");
        }
    }

    #[test]
    fn rejects_bad_choices_and_ordering() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let mut sender = RsaOtSender::new(&mut rng, BITS).unwrap();
        let instance = secrets(&mut rng, 2);
        let params = sender.setup(&mut rng, vec![instance]).unwrap();

        let mut receiver = RsaOtReceiver::new();
        assert!(matches!(
            receiver.query(&mut rng, &params, &[2]),
            Err(OtError::ChoiceOutOfRange { choice: 2, count: 2 })
        ));
        assert!(matches!(
            receiver.query(&mut rng, &params, &[0, 1]),
            Err(OtError::CountMismatch { .. })
        ));
        assert!(matches!(
            receiver.resolve(&Response { masked: vec![] }),
            Err(OtError::OutOfOrder(_))
        ));
    }

    #[test]
    fn rejects_unreduced_query() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let mut sender = RsaOtSender::new(&mut rng, BITS).unwrap();
        let instance = secrets(&mut rng, 2);
        let params = sender.setup(&mut rng, vec![instance]).unwrap();

        let query = Query { vs: vec![params.n.clone()] };
        assert!(matches!(sender.transfer(&query), Err(OtError::InvalidQuery)));
    }
}
