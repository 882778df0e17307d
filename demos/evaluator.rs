//! Evaluator side of the 2-bit comparator: connects to a garbler and
//! learns whether the garbler's operand is below `b`.

use std::{fs, net::TcpStream, path::PathBuf};

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use yao_gc::{comparator_inputs, ot::Grouping, EvaluatorSession, SessionConfig};

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
#[clap(about = "Evaluates the comparator a < b served by a garbler")]
struct Args {
    #[clap(long, default_value = "127.0.0.1", help = "Garbler host")]
    host: String,
    #[clap(short, long, default_value_t = 7878, help = "Garbler port")]
    port: u16,
    #[clap(help = "The evaluator's operand, 0 to 3")]
    b: usize,
    #[clap(long, help = "JSON session settings; flags below override it")]
    config: Option<PathBuf>,
    #[clap(long, value_enum, help = "Must match the garbler")]
    grouping: Option<Bundling>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if args.b > 3 {
        return Err(format!("operand {} does not fit in two bits", args.b).into());
    }

    let mut config = load_config(args.config.as_ref())?;
    if let Some(grouping) = args.grouping {
        config.grouping = grouping.into();
    }

    let (_, inputs) = comparator_inputs(0, args.b);
    let mut stream = TcpStream::connect((args.host.as_str(), args.port))?;

    let output = EvaluatorSession::new(config).run(&mut stream, &mut rand::thread_rng(), &inputs)?;
    println!("a < {}: {output}", args.b);

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(SessionConfig::default()),
    }
}
