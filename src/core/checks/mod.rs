pub mod context;
pub mod machine;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::core::error::ClientResult;
use crate::core::http::build_http_client;
use crate::core::integrity::{IntegrityChecker, RemoteManifest};
use crate::core::ipc::{MessageSink, ParentChannel};
use crate::core::platform::{system_registry, LaunchConfigManager, LocalConfigStore};
use crate::core::process::{ProcessSupervisor, SystemProcesses};
use crate::core::sandbox::SandboxInstaller;
use crate::core::settings::CheckSettings;

pub use context::OrchestrationContext;
pub use machine::{CheckCollaborators, CheckMachine};
pub use state::{CheckOutcome, CheckState};

/// Wire the real collaborators for this machine.
pub fn system_collaborators(
    settings: &CheckSettings,
    sink: Arc<dyn MessageSink>,
) -> ClientResult<CheckCollaborators> {
    let client = build_http_client(settings.http_timeout_secs)?;
    let processes = Arc::new(SystemProcesses);

    Ok(CheckCollaborators {
        registry: system_registry(),
        integrity: IntegrityChecker::new(
            Arc::new(RemoteManifest::new(client, settings.manifest_url.clone())),
            sink.clone(),
        ),
        launch_config: LaunchConfigManager::new(
            Arc::new(LocalConfigStore::new(settings.game_app_id)),
            settings.launch_option.clone(),
        ),
        sandbox: SandboxInstaller::new(settings.resolved_sandbox_dir(), sink),
        supervisor: ProcessSupervisor::new(
            processes.clone(),
            processes,
            Duration::from_secs(settings.kill_timeout_secs),
        ),
    })
}

/// Run the startup checks until they finish or the parent says `exit`.
pub async fn run_checks(
    settings: CheckSettings,
    deps: CheckCollaborators,
    sink: Arc<dyn MessageSink>,
    parent: ParentChannel,
) -> ClientResult<()> {
    let ParentChannel { mut lines, exit } = parent;
    let machine = CheckMachine::new(settings, deps, sink);

    tokio::select! {
        outcome = machine.run(&mut lines) => {
            outcome?;
            Ok(())
        }
        Ok(()) = exit => {
            info!("Stopping the startup checks at the parent's request");
            Ok(())
        }
    }
}
