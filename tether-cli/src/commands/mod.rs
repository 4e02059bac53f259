use crate::cli::Commands;
use anyhow::Result;

pub mod exec;
pub mod namespace;

/// Dispatch command to appropriate handler, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Namespace { pid } => namespace::execute(pid).map(|()| 0),

        Commands::Exec {
            pid,
            container,
            command,
        } => exec::execute(pid, container, &command).await,
    }
}
