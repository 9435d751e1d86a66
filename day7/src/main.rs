use day7::{analyze, DiskConfig};
use util::{init_tracing, read_input_file};

use anyhow::{Context, Result};

fn main() -> Result<()> {
    init_tracing();

    let config = DiskConfig::default();
    let input = read_input_file("input.txt")?;
    let res = analyze(&input, &config).context("Unable to analyze input.txt")?;

    println!(
        "The sum of all folder sizes at most {} is: {}",
        config.threshold, res.bounded_total
    );
    println!(
        "The size of the smallest dir that should be deleted to make room is: {}",
        res.smallest_to_delete
    );

    Ok(())
}
