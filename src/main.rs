use clap::Parser;

use climdiag::inventory;
use climdiag::run::{run_diagnostic, RunArgs};

fn main() -> anyhow::Result<()> {
    let args = RunArgs::parse();

    run_diagnostic(&args, |cfg| {
        inventory::run(cfg)?;
        Ok(())
    })
}
