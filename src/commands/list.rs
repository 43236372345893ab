//! List command implementation

use stadiaflash_hid::list_controllers;

/// Print every attached controller and its mode
pub fn run_list() -> Result<(), Box<dyn std::error::Error>> {
    let controllers = list_controllers()?;

    if controllers.is_empty() {
        println!("No controllers found.");
        return Ok(());
    }

    println!("Attached controllers:");
    println!();
    for controller in &controllers {
        println!("  {}", controller);
    }

    Ok(())
}
