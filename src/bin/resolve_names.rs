// src/bin/resolve_names.rs

use anyhow::Result;
use clap::Parser;
use countrypanel::{
    country::{Canonicalizer, ReferenceList, Resolution, Resolver, DEFAULT_THRESHOLD},
    logging,
};
use std::path::PathBuf;

/// Print the ISO3 resolution of each country name.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(required = true)]
    names: Vec<String>,

    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// `iso3,name,aliases` CSV instead of the built-in list.
    #[arg(long)]
    reference: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let reference = match &args.reference {
        Some(path) => ReferenceList::from_csv(path)?,
        None => ReferenceList::builtin()?,
    };
    let mut canon = Canonicalizer::new(Resolver::new(reference, args.threshold));

    let mut unresolved = 0;
    for name in &args.names {
        match canon.resolve(name) {
            Resolution::Matched(m) => println!(
                "{name}\t{}\t{}\t{:?}\t{:.3}",
                m.iso3, m.name, m.kind, m.score
            ),
            Resolution::Unresolved => {
                unresolved += 1;
                println!("{name}\t-\tunresolved");
            }
        }
    }
    if unresolved == args.names.len() {
        anyhow::bail!("none of the names resolved");
    }
    Ok(())
}
