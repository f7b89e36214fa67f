#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Basic range coder example
//!
//! Encodes a pseudo-random stream of uniform integers, biased flags and
//! (optionally) raw bits into a single frame, decodes it back and checks that
//! every symbol survived the round trip.

use clap::Parser;
use moosicbox_range_coder::{MAX_FRAME_BYTES, RangeDecoder, RangeEncoder};
use rand::{Rng as _, SeedableRng as _, rngs::StdRng};

#[derive(Parser, Debug)]
#[command(author, version, about = "Round-trip a random symbol stream through the range coder")]
struct Args {
    /// Frame buffer size in bytes
    #[arg(short, long, default_value_t = MAX_FRAME_BYTES, value_name = "BYTES")]
    capacity: usize,

    /// Number of symbols to encode
    #[arg(short, long, default_value_t = 200, value_name = "COUNT")]
    symbols: usize,

    /// Seed for the symbol generator
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Also interleave raw bit fields of this width (0 disables them)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=25))]
    raw_bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Uint { value: u32, total: u32 },
    Flag { set: bool, logp: u32 },
    Raw { value: u32, bits: u32 },
}

fn generate(args: &Args) -> Vec<Symbol> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut symbols = Vec::with_capacity(args.symbols);

    while symbols.len() < args.symbols {
        let total = rng.random_range(2..=100_000);
        symbols.push(Symbol::Uint {
            value: rng.random_range(0..total),
            total,
        });

        let logp = rng.random_range(1..=15);
        symbols.push(Symbol::Flag {
            set: rng.random_bool(1.0 / f64::from(1_u32 << logp)),
            logp,
        });

        if args.raw_bits > 0 {
            symbols.push(Symbol::Raw {
                value: rng.random_range(0..1 << args.raw_bits),
                bits: args.raw_bits,
            });
        }
    }

    symbols.truncate(args.symbols);
    symbols
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let symbols = generate(&args);

    let mut buffer = vec![0_u8; args.capacity];
    let mut encoder = RangeEncoder::new(&mut buffer);

    for symbol in &symbols {
        match *symbol {
            Symbol::Uint { value, total } => encoder.ec_enc_uint(value, total),
            Symbol::Flag { set, logp } => encoder.ec_enc_bit_logp(set, logp),
            Symbol::Raw { value, bits } => encoder.ec_enc_bits(value, bits),
        }
    }

    let estimated_bits = encoder.ec_tell_frac();
    let range_bytes = encoder.finish()?;

    log::info!(
        "Encoded {} symbols into {} byte frame: {range_bytes} range coder bytes, {:.3} bits used",
        symbols.len(),
        args.capacity,
        f64::from(estimated_bits) / 8.0,
    );

    let mut decoder = RangeDecoder::new(&buffer);

    for (i, symbol) in symbols.iter().enumerate() {
        let decoded = match *symbol {
            Symbol::Uint { total, .. } => Symbol::Uint {
                value: decoder.ec_dec_uint(total),
                total,
            },
            Symbol::Flag { logp, .. } => Symbol::Flag {
                set: decoder.ec_dec_bit_logp(logp),
                logp,
            },
            Symbol::Raw { bits, .. } => Symbol::Raw {
                value: decoder.ec_dec_bits(bits),
                bits,
            },
        };

        if decoded != *symbol {
            return Err(format!("symbol {i} decoded as {decoded:?}, expected {symbol:?}").into());
        }
    }

    if let Some(error) = decoder.error() {
        return Err(error.into());
    }

    log::info!(
        "Decoded all {} symbols, {:.3} bits consumed",
        symbols.len(),
        f64::from(decoder.ec_tell_frac()) / 8.0,
    );

    Ok(())
}
