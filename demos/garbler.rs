//! Garbler side of the 2-bit comparator: listens for one evaluator and
//! contributes the operand `a`.

use std::{collections::BTreeSet, fs, net::TcpListener, path::PathBuf};

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use yao_gc::{comparator_circuit, comparator_inputs, ot::Grouping, GarblerSession, SessionConfig};

#[derive(Clone, Copy, ValueEnum)]
enum Bundling {
    PerBit,
    Pairs,
}

impl From<Bundling> for Grouping {
    fn from(bundling: Bundling) -> Self {
        match bundling {
            Bundling::PerBit => Grouping::PerBit,
            Bundling::Pairs => Grouping::Pairs,
        }
    }
}

#[derive(Parser)]
#[clap(about = "Garbles the comparator a < b and serves it to one evaluator")]
struct Args {
    #[clap(long, default_value = "127.0.0.1", help = "Address to listen on")]
    host: String,
    #[clap(short, long, default_value_t = 7878, help = "Port to listen on")]
    port: u16,
    #[clap(help = "The garbler's operand, 0 to 3")]
    a: usize,
    #[clap(long, help = "JSON session settings; flags below override it")]
    config: Option<PathBuf>,
    #[clap(long, help = "RSA modulus size for oblivious transfer")]
    rsa_bits: Option<usize>,
    #[clap(long, value_enum, help = "How evaluator wires are bundled into OT instances")]
    grouping: Option<Bundling>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if args.a > 3 {
        return Err(format!("operand {} does not fit in two bits", args.a).into());
    }

    let mut config = load_config(args.config.as_ref())?;
    if let Some(rsa_bits) = args.rsa_bits {
        config.rsa_bits = rsa_bits;
    }
    if let Some(grouping) = args.grouping {
        config.grouping = grouping.into();
    }

    let circuit = comparator_circuit()?;
    let (inputs, evaluator_inputs) = comparator_inputs(args.a, 0);
    let evaluator_wires = evaluator_inputs.into_keys().collect::<BTreeSet<_>>();

    let listener = TcpListener::bind((args.host.as_str(), args.port))?;
    println!("Waiting for evaluator on {}", listener.local_addr()?);
    let (mut stream, peer) = listener.accept()?;
    println!("Evaluator connected from {peer}");

    GarblerSession::new(&circuit, config).run(
        &mut stream,
        &mut rand::thread_rng(),
        &inputs,
        &evaluator_wires,
    )?;
    println!("Sent garbled circuit");

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(SessionConfig::default()),
    }
}
