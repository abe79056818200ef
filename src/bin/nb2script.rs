use std::path::PathBuf;

use anyhow::Context;
use caption_server::notebook::{convert_file, default_output_path};
use clap::Parser;

/// Convert a Jupyter notebook into a plain Python script.
#[derive(Parser)]
#[command(name = "nb2script")]
#[command(version)]
struct Args {
    /// Notebook to convert (.ipynb)
    notebook: PathBuf,

    /// Script to write, defaults to the notebook path with a .py extension
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&args.notebook));

    convert_file(&args.notebook, &output)
        .with_context(|| format!("converting {}", args.notebook.display()))?;

    println!("Converted notebook to script at: {}", output.display());
    Ok(())
}
