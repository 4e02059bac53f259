//! Exec command implementation

use anyhow::{Context, Result, bail};
use std::os::unix::process::ExitStatusExt;
use std::process::Command;
use std::sync::Arc;
use tether_core::{ContainerId, ProcessId};
use tether_engine::{Engine, StaticEngine};
use tether_netns::NetnsManager;
use tracing::{debug, info};

pub async fn execute(
    pid: Option<i32>,
    container: Option<String>,
    command: &[String],
) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        bail!("No command given");
    };

    let (engine, container_id) = resolve_target(pid, container)?;
    let manager = NetnsManager::new(engine);

    info!(
        container_id = %container_id,
        command = %command.join(" "),
        "Running in network namespace"
    );

    let status = manager
        .run_in_container_namespace(&container_id, {
            let program = program.clone();
            let args = args.to_vec();
            move || Command::new(program).args(args).status()
        })
        .await
        .with_context(|| format!("Failed to enter network namespace of {container_id}"))?
        .with_context(|| format!("Failed to run {program}"))?;

    debug!(?status, "Command finished");

    // 128 + signal, like a shell
    Ok(status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1))
}

fn resolve_target(
    pid: Option<i32>,
    container: Option<String>,
) -> Result<(Arc<dyn Engine>, ContainerId)> {
    if let Some(pid) = pid {
        let id = ContainerId::new(format!("pid-{pid}")).context("Invalid PID")?;
        let engine = StaticEngine::with_container(id.clone(), ProcessId::from_raw(pid));
        return Ok((Arc::new(engine), id));
    }

    let Some(container) = container else {
        bail!("Either --pid or --container is required");
    };
    let id = ContainerId::new(container).context("Invalid container ID")?;

    docker_engine().map(|engine| (engine, id))
}

#[cfg(feature = "docker")]
fn docker_engine() -> Result<Arc<dyn Engine>> {
    let engine = tether_engine::DockerEngine::connect().context("Failed to connect to Docker")?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "docker"))]
fn docker_engine() -> Result<Arc<dyn Engine>> {
    bail!("--container requires tether to be built with the `docker` feature")
}
