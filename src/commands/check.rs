//! Check command implementation.

use anyhow::Result;
use std::path::Path;

use crate::config::{validate_effective_config, Config};
use crate::process::{ProcessBackend, ProcessHandle};
use crate::system::{default_backend, ProcFs};

/// Validates system requirements, configuration and server resolution.
///
/// Returns `Ok(false)` when any check failed.
pub fn command_check(proc: bool, server: bool, all: bool, config: &Config) -> Result<bool> {
    println!("🔍 bench-rt - System Check");
    println!("==========================");

    let mut all_ok = true;

    if proc || all {
        println!("\n📁 Checking /proc filesystem...");
        if Path::new("/proc").exists() {
            println!("   ✅ /proc filesystem accessible");

            let procfs = ProcFs::new();
            let pid = std::process::id();
            match (procfs.cpu_times(pid), procfs.resident_memory_bytes(pid)) {
                (Ok(cpu), Ok(rss)) => println!(
                    "   ✅ Counters readable: user={:.2}s system={:.2}s RSS={}MB",
                    cpu.user,
                    cpu.system,
                    rss / 1024 / 1024
                ),
                (Err(e), _) | (_, Err(e)) => {
                    println!("   ❌ Cannot read process counters: {}", e);
                    all_ok = false;
                }
            }
        } else {
            println!("   ❌ /proc filesystem not found");
            all_ok = false;
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    if server || all {
        println!("\n🖥️  Checking server processes...");
        let backend = default_backend();
        for binary in config.binaries() {
            let handle = ProcessHandle::new(backend.clone(), config.server_lookup(&binary));
            match handle.resolve_identity() {
                Ok(id) => println!("   ✅ {}: {} is pid {}", binary, handle.label(), id.pid),
                Err(e) => {
                    println!("   ❌ {}: {}", binary, e);
                    all_ok = false;
                }
            }
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
    } else {
        println!("   ❌ Some checks failed - please review warnings");
    }
    Ok(all_ok)
}
