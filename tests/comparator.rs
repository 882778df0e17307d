use std::{
    collections::{BTreeMap, BTreeSet},
    net::{TcpListener, TcpStream},
    thread,
};

use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rstest::rstest;
use yao_gc::{
    comparator_circuit, comparator_inputs, decompose, millionaires_circuit, ot::Grouping, Circuit,
    EvaluatorSession, GarblerSession, SessionConfig, WireLabel,
};

fn config(grouping: Grouping) -> SessionConfig {
    SessionConfig {
        rsa_bits: 512,
        grouping,
        ..Default::default()
    }
}

/// Runs one session over loopback TCP and returns the evaluator's output.
fn run_session(
    circuit: Circuit,
    garbler_inputs: BTreeMap<WireLabel, bool>,
    evaluator_inputs: BTreeMap<WireLabel, bool>,
    config: SessionConfig,
    seed: u64,
) -> bool {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let evaluator_wires = evaluator_inputs.keys().copied().collect::<BTreeSet<_>>();

    let garbler_config = config.clone();
    let garbler = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        GarblerSession::new(&circuit, garbler_config)
            .run(&mut stream, &mut rng, &garbler_inputs, &evaluator_wires)
            .unwrap();
    });

    let mut stream = TcpStream::connect(addr).unwrap();
    let mut rng = ChaCha12Rng::seed_from_u64(seed.wrapping_add(1));
    let output = EvaluatorSession::new(config)
        .run(&mut stream, &mut rng, &evaluator_inputs)
        .unwrap();

    garbler.join().unwrap();
    output
}

#[rstest]
#[case::per_bit(Grouping::PerBit)]
#[case::pairs(Grouping::Pairs)]
fn comparator_over_tcp(#[case] grouping: Grouping) {
    let circuit = comparator_circuit().unwrap();
    for a in 0..4 {
        for b in 0..4 {
            let (garbler_inputs, evaluator_inputs) = comparator_inputs(a, b);
            let output = run_session(
                circuit.clone(),
                garbler_inputs,
                evaluator_inputs,
                config(grouping),
                (a * 4 + b) as u64,
            );
            assert_eq!(output, a < b, "{a} < {b}");
        }
    }
}

#[test]
fn millionaires_over_tcp() {
    let n = 3;
    let circuit = millionaires_circuit(n as usize).unwrap();
    for (a, b) in [(0, 0), (5, 3), (3, 5), (7, 7), (6, 7)] {
        let garbler_inputs = decompose(a, n)
            .into_iter()
            .enumerate()
            .map(|(i, bit)| (WireLabel(i), bit))
            .collect();
        let evaluator_inputs = decompose(b, n)
            .into_iter()
            .enumerate()
            .map(|(i, bit)| (WireLabel(n as usize + i), bit))
            .collect();

        let output = run_session(
            circuit.clone(),
            garbler_inputs,
            evaluator_inputs,
            config(Grouping::Pairs),
            a as u64,
        );
        assert_eq!(output, a >= b, "{a} >= {b}");
    }
}
