//! Reset command implementation

use super::Options;

/// Reset a controller running the flashloader
pub fn run_reset(opts: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let mut device = opts.open_device()?;
    opts.flashloader(&mut device)?.reset()?;
    println!("Reset sent");
    Ok(())
}
