use std::path::PathBuf;

use clap::Parser;
use tf_import::ModelGen;

/// Converts a normalized source model into a channel-last target graph.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Target source model file, e.g. model.json
    #[arg(short, long)]
    model: PathBuf,

    /// Name of the output file
    #[arg(short, long, default_value = "converted_model.json")]
    output: PathBuf,
}

fn main() {
    let args = Args::parse();

    if let Err(err) = ModelGen::new()
        .model(&args.model)
        .output(&args.output)
        .run_from_cli()
    {
        log::error!("Conversion failed: {err}");
        std::process::exit(1);
    }
}
