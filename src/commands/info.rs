//! Info command implementation

use stadiaflash_core::controller::{firmware_family, SerialInfo};
use stadiaflash_core::DeviceMode;
use stadiaflash_hid::{find_controller, Oem};

use super::Options;

/// Print serial classification, firmware build and battery level
///
/// Fails for controllers whose serial number marks them as unflashable.
pub fn run_info(opts: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let controller = find_controller(opts.serial.as_deref())?;
    println!("Found: {}", controller);

    if controller.mode != DeviceMode::Oem {
        return Err(format!(
            "Controller is in {} mode; info needs the normal firmware running",
            controller.mode
        )
        .into());
    }

    let oem = Oem::open(&controller)?;

    let serial = controller.serial.as_deref().unwrap_or_default();
    println!("Controller serial number: {}", serial);

    let class = SerialInfo::classify(serial);
    if !class.flashable {
        return Err(format!(
            "Unable to flash devices with serial number prefix {}",
            serial.get(0..2).unwrap_or(serial)
        )
        .into());
    }
    println!("Controller is a {} device", class.revision);

    match oem.firmware_version()? {
        Some(build) => println!(
            "Current firmware is {} build {}",
            firmware_family(build),
            build
        ),
        None => println!("Current firmware version is unknown"),
    }

    match oem.battery_percentage()? {
        Some(level) => println!("Current battery level: {}%", level),
        None => println!("Current battery level is unknown"),
    }

    Ok(())
}
