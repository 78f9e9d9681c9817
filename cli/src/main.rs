use std::process;

use anyhow::bail;
use scons2cmake::Converter;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod discover;
mod runtime;

use runtime::Host;

fn main() -> anyhow::Result<()> {
    let args = cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    if !args.root.is_dir() {
        bail!("{} is not a directory", args.root.display());
    }
    let scripts = discover::scripts(&args.root, args.mode())?;
    info!("found {} script(s) under {}", scripts.len(), args.root.display());

    let mut converter = Converter::new(Host, args.root.to_string_lossy());
    converter.options(args.convert_options()).dry_run(args.dry_run);
    let manifest = converter.convert_all(&scripts);
    println!("{manifest}");

    if !manifest.is_success() {
        process::exit(1);
    }
    Ok(())
}
