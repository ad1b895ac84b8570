//! Example usage of the registry-bridge library.

use registry_bridge::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn backend() -> Arc<dyn RegistryApi> {
    #[cfg(windows)]
    {
        Arc::new(registry_bridge::win32::Win32Registry::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(
            MemoryRegistry::builder()
                .env("SystemRoot", "C:\\Windows")
                .env("USERNAME", "demo")
                .build(),
        )
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Registry Bridge Demo\n");
    let api = backend();
    let hkcu = RegistryKey::root(Arc::clone(&api), Predefined::CurrentUser);

    // Demonstrate key creation
    println!("=== Keys ===");
    let key = hkcu.create_subkey("Software\\RegistryBridgeDemo", None, Access::ALL)?;
    println!("Key: {} (created: {})", key.full_name(), key.was_created());
    println!();

    // Demonstrate typed values
    println!("=== Values ===");
    key.set_registry_value(&RegistryValue::string("Name", "Alice"))?;
    key.set_registry_value(&RegistryValue::dword("Count", 0))?;
    key.set_registry_value(&RegistryValue::multi_string("Tags", ["a", "", "bb"]))?;
    key.set_registry_value(&RegistryValue::binary("Blob", vec![0xDE, 0xAD, 0xBE, 0xEF]))?;

    println!("Name: {}", key.get_string_value("Name")?);
    key.increment_dword("Count")?;
    println!("Count after increment: {}", key.increment_dword("Count")?);
    if let Some(tags) = key.get_value("Tags")?.as_multi_string() {
        println!("Tags: {:?}", tags);
    }
    println!();

    // Demonstrate enumeration
    println!("=== Enumeration ===");
    println!("{} values, longest name {}", key.value_count()?, key.max_value_name_length()?);
    for name in key.values()? {
        let name = name?;
        println!("  {} = {}", name, key.get_value(&name)?);
    }
    println!();

    // Demonstrate environment expansion
    println!("=== Environment ===");
    println!("{}", expand_environment_strings(&*api, "%SystemRoot%\\System32")?);
    println!();

    key.close();
    hkcu.delete_subkey("Software\\RegistryBridgeDemo")?;
    match hkcu.open_subkey_default("Software\\RegistryBridgeDemo") {
        Err(e) if e.is_not_found() => println!("Cleaned up: {}", e),
        Err(e) => return Err(e),
        Ok(_) => println!("Key still present"),
    }

    println!("\nDemo complete!");
    Ok(())
}
