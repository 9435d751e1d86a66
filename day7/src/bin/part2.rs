use day7::{analyze, DiskConfig};
use util::{init_tracing, read_input_as_string};

use anyhow::Result;

fn main() -> Result<()> {
    init_tracing();

    let res = analyze(read_input_as_string()?.as_str(), &DiskConfig::default())?;

    println!("{}", res.smallest_to_delete);

    Ok(())
}
