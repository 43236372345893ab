//! Flash dump command implementation

use stadiaflash_core::hardware::FlashPart;
use stadiaflash_core::orchestrator::{Orchestrator, RetryPolicy};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::flash::config_blocks_for;
use super::{byte_progress, Options};

/// Dump flash words in `[start, end)` to `output`
pub fn run_dump(
    opts: &Options,
    start: u32,
    end: u32,
    output: &Path,
    retries: Option<u32>,
    part: Option<FlashPart>,
) -> Result<(), Box<dyn std::error::Error>> {
    if end <= start {
        return Err(format!("End 0x{:08x} must be above start 0x{:08x}", end, start).into());
    }
    let policy = retries.map_or(RetryPolicy::Unbounded, RetryPolicy::Bounded);

    let blocks = config_blocks_for(opts, part)?;

    let mut device = opts.open_device()?;
    let mut orch = Orchestrator::new(opts.flashloader(&mut device)?);

    let (mcu, flash) = orch.prepare(&blocks, part)?;
    println!("MCU: {}, flash: {}", mcu, flash);

    let mut out = BufWriter::new(File::create(output)?);
    let mut written = 0u64;

    let first = start & !3;
    let pb = byte_progress(((end & !3) - first) as u64)?;
    let result = orch.dump(
        start,
        end,
        policy,
        |offset, word| -> Result<(), Box<dyn std::error::Error>> {
            out.write_all(&word.to_le_bytes())?;
            written += 4;
            pb.set_position((offset - first + 4) as u64);
            Ok(())
        },
    );
    pb.finish_and_clear();

    let flushed = out.flush();
    if let Err(e) = result {
        log::warn!("Dump aborted, {} bytes kept in {:?}", written, output);
        return Err(e);
    }
    flushed?;
    println!("Wrote {} bytes to {:?}", written, output);

    Ok(())
}
