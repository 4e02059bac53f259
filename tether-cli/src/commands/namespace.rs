//! Namespace command implementation

use anyhow::{Context, Result};
use tether_core::ProcessId;
use tether_netns::net_namespace_id;

pub fn execute(pid: Option<i32>) -> Result<()> {
    let target = pid.map_or_else(ProcessId::current, ProcessId::from_raw);
    let own = ProcessId::current();

    let net = net_namespace_id(target)
        .with_context(|| format!("Failed to get network namespace of PID {target}"))?;
    println!("PID {target}: {net}");

    if target != own {
        match net_namespace_id(own) {
            Ok(ours) if ours == net => println!("Shares this process's network namespace"),
            Ok(_) => println!("Isolated from this process's network namespace"),
            Err(e) => tracing::warn!(error = %e, "Could not read own network namespace"),
        }
    }

    Ok(())
}
