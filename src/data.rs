//! Data file lookup (flashloader image, FlexSPI configuration blocks)

use stadiaflash_core::orchestrator::ConfigBlocks;
use std::path::{Path, PathBuf};

/// Flashloader image loaded through SDP
pub const FLASHLOADER_IMAGE: &str = "restricted_ivt_flashloader.bin";
/// Configuration block whose read sequence returns the vendor id
pub const FCB_GET_VENDOR_ID: &str = "flashloader_fcb_get_vendor_id.bin";
/// Configuration block for the Winbond W25Q128JW
pub const FCB_W25Q128JW: &str = "flashloader_fcb_w25q128jw.bin";

/// Resolve the data directory
///
/// An explicit directory must exist. Otherwise the first existing default
/// location is used.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(dir) = explicit {
        if !dir.is_dir() {
            return Err(format!("Data directory not found: {}", dir.display()).into());
        }
        return Ok(dir.to_path_buf());
    }

    let default_paths = [
        PathBuf::from("data"),
        PathBuf::from("/usr/share/stadiaflash"),
        PathBuf::from("/usr/local/share/stadiaflash"),
    ];

    default_paths
        .into_iter()
        .find(|dir| dir.is_dir())
        .ok_or_else(|| {
            "No data directory found in ./data, /usr/share/stadiaflash or \
             /usr/local/share/stadiaflash; use --data-dir"
                .into()
        })
}

/// Read a file, naming it in the error
pub fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let data =
        std::fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    log::debug!("Loaded {} ({} bytes)", path.display(), data.len());
    Ok(data)
}

/// Load both configuration blocks from the data directory
pub fn load_config_blocks(explicit: Option<&Path>) -> Result<ConfigBlocks, Box<dyn std::error::Error>> {
    let dir = data_dir(explicit)?;
    Ok(ConfigBlocks {
        get_vendor_id: read_file(&dir.join(FCB_GET_VENDOR_ID))?,
        w25q128jw: read_file(&dir.join(FCB_W25Q128JW))?,
    })
}
