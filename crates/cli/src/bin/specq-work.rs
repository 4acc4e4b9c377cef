//! specq-work — worker-side payload.
//!
//! Reads its input file, sleeps for the requested runtime (multiplied by
//! 2.5 with the given probability, simulating a straggler), then writes the
//! bytes back out. The coin flip lives worker-side so redundant copies of
//! the same task can take different paths.

use std::fs;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;

#[derive(Parser, Debug)]
#[command(name = "specq-work", version, about)]
struct Cli {
    /// Input file to read.
    infile: String,
    /// Output file to write.
    outfile: String,
    /// Base runtime in seconds.
    runtime: f64,
    /// Probability of running for 2.5x the base runtime.
    chance: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data = fs::read(&cli.infile)
        .with_context(|| format!("cannot read input {}", cli.infile))?;
    println!("[worker] read {} bytes from {}", data.len(), cli.infile);

    let mut runtime = cli.runtime;
    if rand::thread_rng().gen::<f64>() <= cli.chance {
        runtime *= 2.5;
    }
    println!("[worker] processing for {:.2} secs", runtime);
    thread::sleep(Duration::from_secs_f64(runtime.max(0.0)));

    fs::write(&cli.outfile, &data)
        .with_context(|| format!("cannot write output {}", cli.outfile))?;
    println!("[worker] wrote {} bytes to {}", data.len(), cli.outfile);
    Ok(())
}
