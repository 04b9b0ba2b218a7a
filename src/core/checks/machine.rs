// ─── Startup Checks ───
// 1) Mod integrity: the workshop download regularly ends up partial or stale,
//    so every file is compared against the published checksums.
// 2) `--luadebug` launch option: needed for the mod to talk to the client,
//    and only writable while Steam is fully closed.
// 3) Lua sandbox: since `--luadebug` opens everything up, the sandbox
//    scripts must be in place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::context::OrchestrationContext;
use super::state::{CheckOutcome, CheckState};
use crate::core::error::{ClientError, ClientResult};
use crate::core::integrity::IntegrityChecker;
use crate::core::ipc::{Message, MessageSink, ParentEvent};
use crate::core::platform::{
    parse_active_user, parse_platform_path, LaunchConfigManager, PlatformRegistry, RegistryValue,
};
use crate::core::process::{ProcessHandle, ProcessSupervisor};
use crate::core::sandbox::SandboxInstaller;
use crate::core::settings::CheckSettings;

/// The collaborators the state machine drives.
pub struct CheckCollaborators {
    pub registry: Arc<dyn PlatformRegistry>,
    pub integrity: IntegrityChecker,
    pub launch_config: LaunchConfigManager,
    pub sandbox: SandboxInstaller,
    pub supervisor: ProcessSupervisor,
}

pub struct CheckMachine {
    settings: CheckSettings,
    deps: CheckCollaborators,
    sink: Arc<dyn MessageSink>,
    context: OrchestrationContext,
}

impl CheckMachine {
    pub fn new(
        settings: CheckSettings,
        deps: CheckCollaborators,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            settings,
            deps,
            sink,
            context: OrchestrationContext::default(),
        }
    }

    /// Run every step to a terminal state. `game_paths` yields the lines the
    /// parent sends; the first one is the game executable path.
    pub async fn run(
        mut self,
        game_paths: &mut mpsc::UnboundedReceiver<String>,
    ) -> ClientResult<CheckOutcome> {
        let mut state = CheckState::AwaitGamePath;
        loop {
            debug!("Startup check state: {:?}", state);
            state = match state {
                CheckState::Done(outcome) => {
                    self.sink.send(outcome.event().into())?;
                    info!("Startup checks finished: {:?}", outcome);
                    return Ok(outcome);
                }
                other => self.step(other, game_paths).await?,
            };
        }
    }

    async fn step(
        &mut self,
        state: CheckState,
        game_paths: &mut mpsc::UnboundedReceiver<String>,
    ) -> ClientResult<CheckState> {
        match state {
            CheckState::AwaitGamePath => self.await_game_path(game_paths).await,
            CheckState::ResolvePlatformPath => self.resolve_platform_path().await,
            CheckState::ResolveActiveUser => self.resolve_active_user().await,
            CheckState::LocateMod => self.locate_mod().await,
            CheckState::VerifyModIntegrity { mod_root } => self.verify_mod(mod_root).await,
            CheckState::CheckLaunchOption => self.check_launch_option().await,
            CheckState::CheckSandboxAssets => self.check_sandbox().await,
            CheckState::DecideRestart => self.decide_restart().await,
            CheckState::NoRestartNeeded => {
                self.progress("File system validation passed. (No changes needed to be made.)")?;
                Ok(CheckState::Done(CheckOutcome::ChecksComplete))
            }
            CheckState::CloseGame(handle) => self.close_game(handle).await,
            CheckState::CloseOrRestartPlatform => self.close_platform().await,
            CheckState::ApplyLaunchOption => self.apply_launch_option().await,
            CheckState::StartGame => {
                // Spawning the game is the parent's job; Steam comes up with it.
                self.sink.send(ParentEvent::StartIsaac.into())?;
                Ok(CheckState::Done(CheckOutcome::ChecksComplete))
            }
            CheckState::Done(outcome) => Ok(CheckState::Done(outcome)),
        }
    }

    fn progress(&self, text: impl Into<String>) -> ClientResult<()> {
        self.sink.send(Message::progress(text))
    }

    async fn await_game_path(
        &mut self,
        game_paths: &mut mpsc::UnboundedReceiver<String>,
    ) -> ClientResult<CheckState> {
        let raw = game_paths
            .recv()
            .await
            .ok_or(ClientError::ParentChannelClosed)?;
        let exe_path = PathBuf::from(raw.trim());
        self.progress(format!("Using an Isaac path of: {}", exe_path.display()))?;

        let is_file = tokio::fs::metadata(&exe_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        let Some(game_path) = exe_path.parent().filter(|_| is_file) else {
            return Ok(CheckState::Done(CheckOutcome::IsaacNotFound));
        };

        self.context.game_path = game_path.to_path_buf();
        self.progress(format!(
            "Using a game path of: {}",
            self.context.game_path.display()
        ))?;
        Ok(CheckState::ResolvePlatformPath)
    }

    async fn resolve_platform_path(&mut self) -> ClientResult<CheckState> {
        self.progress("Checking for the Steam path...")?;

        let raw = self.deps.registry.read(RegistryValue::SteamPath).await?;
        let path = parse_platform_path(&raw)?;
        self.progress(format!("Steam path found: {}", path.display()))?;

        self.context.platform_path = Some(path);
        Ok(CheckState::ResolveActiveUser)
    }

    async fn resolve_active_user(&mut self) -> ClientResult<CheckState> {
        self.progress("Checking for the Steam active user...")?;

        let raw = self.deps.registry.read(RegistryValue::ActiveUser).await?;
        let user = parse_active_user(&raw)?;
        self.progress(format!("Steam active user found: {user}"))?;

        self.context.active_user = Some(user);
        Ok(CheckState::LocateMod)
    }

    async fn locate_mod(&mut self) -> ClientResult<CheckState> {
        let mods_path = self.context.game_path.join("mods");
        if !is_dir(&mods_path).await {
            return Err(ClientError::ModsDirMissing(mods_path));
        }

        let mod_root = mods_path.join(&self.settings.mod_directory_name);
        if !is_dir(&mod_root).await {
            // Usually the user has not subscribed to the mod yet.
            self.progress(format!(
                "Failed to find the Racing+ mod at: {}",
                mod_root.display()
            ))?;
            return Ok(CheckState::Done(CheckOutcome::ModNotFound));
        }

        Ok(CheckState::VerifyModIntegrity { mod_root })
    }

    async fn verify_mod(&mut self, mod_root: PathBuf) -> ClientResult<CheckState> {
        self.progress("Checking to see if the Racing+ mod is corrupted...")?;

        let verdict = self.deps.integrity.verify(&mod_root).await?;
        if !verdict.is_valid() {
            return Ok(CheckState::Done(CheckOutcome::ModCorrupt));
        }

        self.progress("The mod perfectly matched!")?;
        Ok(CheckState::CheckLaunchOption)
    }

    async fn check_launch_option(&mut self) -> ClientResult<CheckState> {
        let option = self.deps.launch_config.option().to_string();
        self.progress(format!("Checking for the \"{option}\" launch option..."))?;

        let (platform_path, user) = self.context.platform()?;
        let present = self
            .deps
            .launch_config
            .has_option(platform_path, user)
            .await?;
        if present {
            self.progress("The launch option is already set.")?;
        } else {
            self.progress("The launch option is not set.")?;
        }

        self.context.record_launch_option(present);
        Ok(CheckState::CheckSandboxAssets)
    }

    async fn check_sandbox(&mut self) -> ClientResult<CheckState> {
        self.progress("Checking to see if the Lua sandbox is in place...")?;

        let valid = self.deps.sandbox.ensure(&self.context.game_path).await?;
        if valid {
            self.progress("The sandbox is in place.")?;
        } else {
            self.progress("The sandbox was corrupted or missing.")?;
        }

        self.context.record_sandbox(valid);
        Ok(CheckState::DecideRestart)
    }

    async fn decide_restart(&mut self) -> ClientResult<CheckState> {
        if !self.context.needs_restart() {
            return Ok(CheckState::NoRestartNeeded);
        }

        let game = self
            .deps
            .supervisor
            .find_process(&self.settings.game_process_name)
            .await?;
        if let Some(handle) = game {
            return Ok(CheckState::CloseGame(handle));
        }
        if self.context.needs_platform_restart {
            return Ok(CheckState::CloseOrRestartPlatform);
        }

        // Not reopening a game that was closed; that would be annoying.
        self.progress("File system repair complete. (Isaac was not open.)")?;
        Ok(CheckState::Done(CheckOutcome::ChecksComplete))
    }

    async fn close_game(&mut self, handle: ProcessHandle) -> ClientResult<CheckState> {
        self.progress("Closing Isaac...")?;
        self.deps.supervisor.kill(&handle).await?;
        self.progress("Closed Isaac.")?;

        if self.context.needs_platform_restart {
            return Ok(CheckState::CloseOrRestartPlatform);
        }

        tokio::time::sleep(Duration::from_millis(self.settings.restart_delay_ms)).await;
        Ok(CheckState::StartGame)
    }

    async fn close_platform(&mut self) -> ClientResult<CheckState> {
        let platform = self
            .deps
            .supervisor
            .find_process(&self.settings.platform_process_name)
            .await?;
        if let Some(handle) = platform {
            self.progress("Closing Steam...")?;
            self.deps.supervisor.kill(&handle).await?;
            self.progress("Closed Steam.")?;
        }

        Ok(CheckState::ApplyLaunchOption)
    }

    async fn apply_launch_option(&mut self) -> ClientResult<CheckState> {
        // Steam would overwrite the file from its in-memory copy.
        let platform_name = &self.settings.platform_process_name;
        if self.deps.supervisor.find_process(platform_name).await?.is_some() {
            return Err(ClientError::PlatformStillRunning(platform_name.clone()));
        }

        let (platform_path, user) = self.context.platform()?;
        self.deps
            .launch_config
            .set_option(platform_path, user)
            .await?;
        self.progress(format!(
            "Set the launch option of \"{}\".",
            self.deps.launch_config.option()
        ))?;

        Ok(CheckState::StartGame)
    }
}

async fn is_dir(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::core::integrity::{sha1_hex, ChecksumManifest, ManifestSource};
    use crate::core::ipc::ChannelSink;
    use crate::core::platform::LaunchOptionStore;
    use crate::core::process::{ProcessLister, ProcessTerminator};

    const ISAAC: &str = "isaac-ng.exe";
    const STEAM: &str = "steam.exe";
    const MOD_DIR: &str = "racing+_857628390";

    type Log = Arc<Mutex<Vec<String>>>;

    struct FakeRegistry {
        steam_path: String,
        active_user: String,
    }

    #[async_trait]
    impl PlatformRegistry for FakeRegistry {
        async fn read(&self, value: RegistryValue) -> ClientResult<String> {
            Ok(match value {
                RegistryValue::SteamPath => self.steam_path.clone(),
                RegistryValue::ActiveUser => self.active_user.clone(),
            })
        }
    }

    struct FakeManifest(ChecksumManifest);

    #[async_trait]
    impl ManifestSource for FakeManifest {
        async fn fetch(&self) -> ClientResult<ChecksumManifest> {
            Ok(self.0.clone())
        }
    }

    struct FakeOs {
        running: Mutex<Vec<(String, u32)>>,
        log: Log,
    }

    impl FakeOs {
        fn is_running(&self, name: &str) -> bool {
            self.running.lock().unwrap().iter().any(|(n, _)| n == name)
        }
    }

    #[async_trait]
    impl ProcessLister for FakeOs {
        async fn list(&self) -> ClientResult<String> {
            Ok(self
                .running
                .lock()
                .unwrap()
                .iter()
                .map(|(name, pid)| format!("{name:<25} {pid:>8} Console 1 1,000 K\r\n"))
                .collect())
        }
    }

    #[async_trait]
    impl ProcessTerminator for FakeOs {
        async fn terminate(&self, handle: &ProcessHandle, _timeout: Duration) -> ClientResult<()> {
            self.running
                .lock()
                .unwrap()
                .retain(|(_, pid)| *pid != handle.pid);
            self.log.lock().unwrap().push(format!("kill {}", handle.name));
            Ok(())
        }
    }

    struct FakeStore {
        options: Mutex<Option<String>>,
        os: Arc<FakeOs>,
        log: Log,
    }

    #[async_trait]
    impl LaunchOptionStore for FakeStore {
        async fn read(&self, _platform_path: &Path, _user: u32) -> ClientResult<Option<String>> {
            Ok(self.options.lock().unwrap().clone())
        }

        async fn write(&self, _platform_path: &Path, _user: u32, options: &str) -> ClientResult<()> {
            assert!(!self.os.is_running(STEAM), "wrote while Steam was running");
            *self.options.lock().unwrap() = Some(options.to_string());
            self.log.lock().unwrap().push(format!("write {options}"));
            Ok(())
        }
    }

    struct Scenario {
        launch_options: Option<&'static str>,
        running: Vec<(&'static str, u32)>,
        sandbox_in_place: bool,
        mod_present: bool,
        mod_corrupt: bool,
        active_user: &'static str,
    }

    impl Default for Scenario {
        fn default() -> Self {
            Self {
                launch_options: Some("--luadebug"),
                running: vec![(STEAM, 10), (ISAAC, 20)],
                sandbox_in_place: true,
                mod_present: true,
                mod_corrupt: false,
                active_user: "0x2a",
            }
        }
    }

    struct RunResult {
        outcome: ClientResult<CheckOutcome>,
        messages: Vec<String>,
        log: Vec<String>,
        stored_options: Option<String>,
    }

    impl RunResult {
        fn position(&self, line: &str) -> usize {
            self.messages
                .iter()
                .position(|m| m == line)
                .unwrap_or_else(|| panic!("{line:?} not sent; got {:?}", self.messages))
        }

        fn sent(&self, line: &str) -> bool {
            self.messages.iter().any(|m| m == line)
        }
    }

    async fn run(scenario: Scenario, exe_override: Option<PathBuf>) -> RunResult {
        let dir = tempfile::tempdir().unwrap();
        let game = dir.path().join("game");
        let exe = game.join(ISAAC);
        let mod_root = game.join("mods").join(MOD_DIR);
        let sandbox_src = dir.path().join("sandbox");

        std::fs::create_dir_all(game.join("mods")).unwrap();
        std::fs::write(&exe, b"MZ").unwrap();
        if scenario.mod_present {
            std::fs::create_dir_all(&mod_root).unwrap();
            let content: &[u8] = if scenario.mod_corrupt { b"tampered" } else { b"race" };
            std::fs::write(mod_root.join("main.lua"), content).unwrap();
        }
        std::fs::create_dir_all(&sandbox_src).unwrap();
        std::fs::write(sandbox_src.join("sandbox.lua"), b"restricted").unwrap();
        if scenario.sandbox_in_place {
            let scripts = SandboxInstaller::scripts_dir(&game);
            std::fs::create_dir_all(&scripts).unwrap();
            std::fs::write(scripts.join("sandbox.lua"), b"restricted").unwrap();
        }

        let log: Log = Arc::default();
        let os = Arc::new(FakeOs {
            running: Mutex::new(
                scenario
                    .running
                    .iter()
                    .map(|(name, pid)| (name.to_string(), *pid))
                    .collect(),
            ),
            log: log.clone(),
        });
        let store = Arc::new(FakeStore {
            options: Mutex::new(scenario.launch_options.map(str::to_string)),
            os: os.clone(),
            log: log.clone(),
        });

        let (sink, mut rx) = ChannelSink::new();
        let sink: Arc<dyn MessageSink> = Arc::new(sink);
        let manifest: ChecksumManifest = [("main.lua".to_string(), sha1_hex(b"race"))]
            .into_iter()
            .collect();

        let settings = CheckSettings {
            sandbox_dir: Some(sandbox_src.clone()),
            restart_delay_ms: 0,
            ..CheckSettings::default()
        };
        let deps = CheckCollaborators {
            registry: Arc::new(FakeRegistry {
                steam_path: "c:/program files (x86)/steam".into(),
                active_user: scenario.active_user.into(),
            }),
            integrity: IntegrityChecker::new(Arc::new(FakeManifest(manifest)), sink.clone()),
            launch_config: LaunchConfigManager::new(store.clone(), "--luadebug"),
            sandbox: SandboxInstaller::new(sandbox_src, sink.clone()),
            supervisor: ProcessSupervisor::new(os.clone(), os.clone(), Duration::from_secs(1)),
        };

        let (tx, mut lines) = mpsc::unbounded_channel();
        let exe = exe_override.unwrap_or(exe);
        tx.send(exe.to_string_lossy().into_owned()).unwrap();

        let outcome = CheckMachine::new(settings, deps, sink)
            .run(&mut lines)
            .await;

        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message.to_string());
        }
        let log = log.lock().unwrap().clone();
        let stored_options = store.options.lock().unwrap().clone();
        RunResult {
            outcome,
            messages,
            log,
            stored_options,
        }
    }

    #[tokio::test]
    async fn missing_option_restarts_game_then_steam_in_order() {
        let result = run(
            Scenario {
                launch_options: None,
                ..Scenario::default()
            },
            None,
        )
        .await;

        assert!(matches!(result.outcome, Ok(CheckOutcome::ChecksComplete)));
        assert_eq!(
            result.log,
            vec!["kill isaac-ng.exe", "kill steam.exe", "write --luadebug"]
        );

        let closing_isaac = result.position("Closing Isaac...");
        let closing_steam = result.position("Closing Steam...");
        let option_set = result.position("Set the launch option of \"--luadebug\".");
        let start = result.position("startIsaac");
        let complete = result.position("isaacChecksComplete");
        assert!(closing_isaac < closing_steam);
        assert!(closing_steam < option_set);
        assert!(option_set < start);
        assert!(start < complete);
        assert_eq!(complete, result.messages.len() - 1);
    }

    #[tokio::test]
    async fn nothing_is_touched_when_no_restart_is_needed() {
        let result = run(Scenario::default(), None).await;

        assert!(matches!(result.outcome, Ok(CheckOutcome::ChecksComplete)));
        assert!(result.log.is_empty());
        assert!(!result.sent("startIsaac"));
        assert!(result.sent("File system validation passed. (No changes needed to be made.)"));
        assert_eq!(result.messages.last().map(String::as_str), Some("isaacChecksComplete"));
    }

    #[tokio::test]
    async fn missing_mod_stops_after_a_single_event() {
        let result = run(
            Scenario {
                mod_present: false,
                launch_options: None,
                ..Scenario::default()
            },
            None,
        )
        .await;

        assert!(matches!(result.outcome, Ok(CheckOutcome::ModNotFound)));
        assert_eq!(result.messages.last().map(String::as_str), Some("modNotFound"));
        assert!(!result.sent("isaacChecksComplete"));
        assert!(!result
            .messages
            .iter()
            .any(|m| m.starts_with("Checking to see if the Racing+ mod")));
        assert!(result.log.is_empty());
        assert_eq!(result.stored_options, None);
    }

    #[tokio::test]
    async fn corrupt_mod_stops_before_the_launch_option() {
        let result = run(
            Scenario {
                mod_corrupt: true,
                launch_options: None,
                ..Scenario::default()
            },
            None,
        )
        .await;

        assert!(matches!(result.outcome, Ok(CheckOutcome::ModCorrupt)));
        assert_eq!(result.messages.last().map(String::as_str), Some("modCorrupt"));
        assert!(result
            .messages
            .iter()
            .any(|m| m.starts_with("File is corrupt: ") && m.ends_with("main.lua")));
        assert!(!result
            .messages
            .iter()
            .any(|m| m.starts_with("Checking for the \"")));
        assert!(!result.sent("isaacChecksComplete"));
        assert!(result.log.is_empty());
        assert_eq!(result.stored_options, None);
    }

    #[tokio::test]
    async fn exit_from_the_parent_cancels_the_checks() {
        let log: Log = Arc::default();
        let os = Arc::new(FakeOs {
            running: Mutex::new(vec![(ISAAC.to_string(), 20)]),
            log: log.clone(),
        });
        let (sink, mut rx) = ChannelSink::new();
        let sink: Arc<dyn MessageSink> = Arc::new(sink);
        let deps = CheckCollaborators {
            registry: Arc::new(FakeRegistry {
                steam_path: "c:/steam".into(),
                active_user: "0x2a".into(),
            }),
            integrity: IntegrityChecker::new(
                Arc::new(FakeManifest(ChecksumManifest::default())),
                sink.clone(),
            ),
            launch_config: LaunchConfigManager::new(
                Arc::new(FakeStore {
                    options: Mutex::new(None),
                    os: os.clone(),
                    log: log.clone(),
                }),
                "--luadebug",
            ),
            sandbox: SandboxInstaller::new(PathBuf::from("/nowhere"), sink.clone()),
            supervisor: ProcessSupervisor::new(os.clone(), os, Duration::from_secs(1)),
        };

        // The game path never arrives, so the machine waits until `exit`.
        let (_line_tx, lines) = mpsc::unbounded_channel();
        let (exit_tx, exit) = tokio::sync::oneshot::channel();
        let checks = tokio::spawn(crate::core::checks::run_checks(
            CheckSettings::default(),
            deps,
            sink,
            crate::core::ipc::ParentChannel { lines, exit },
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!checks.is_finished());
        exit_tx.send(()).unwrap();

        let finished = tokio::time::timeout(Duration::from_secs(5), checks)
            .await
            .unwrap()
            .unwrap();
        assert!(finished.is_ok());
        assert!(rx.try_recv().is_err());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sandbox_repair_restarts_only_the_game() {
        let result = run(
            Scenario {
                sandbox_in_place: false,
                ..Scenario::default()
            },
            None,
        )
        .await;

        assert!(matches!(result.outcome, Ok(CheckOutcome::ChecksComplete)));
        assert_eq!(result.log, vec!["kill isaac-ng.exe"]);
        assert!(!result.sent("Closing Steam..."));
        assert!(result.position("Closed Isaac.") < result.position("startIsaac"));
    }

    #[tokio::test]
    async fn sandbox_repair_does_not_reopen_a_closed_game() {
        let result = run(
            Scenario {
                sandbox_in_place: false,
                running: vec![(STEAM, 10)],
                ..Scenario::default()
            },
            None,
        )
        .await;

        assert!(matches!(result.outcome, Ok(CheckOutcome::ChecksComplete)));
        assert!(result.log.is_empty());
        assert!(result.sent("File system repair complete. (Isaac was not open.)"));
        assert!(!result.sent("startIsaac"));
    }

    #[tokio::test]
    async fn missing_option_with_game_closed_still_restarts_steam() {
        let result = run(
            Scenario {
                launch_options: Some("-windowed"),
                running: vec![(STEAM, 10)],
                ..Scenario::default()
            },
            None,
        )
        .await;

        assert!(matches!(result.outcome, Ok(CheckOutcome::ChecksComplete)));
        assert_eq!(result.log, vec!["kill steam.exe", "write -windowed --luadebug"]);
        assert!(result.sent("startIsaac"));
    }

    #[tokio::test]
    async fn unknown_executable_reports_isaac_not_found() {
        let result = run(Scenario::default(), Some(PathBuf::from("/nowhere/isaac-ng.exe"))).await;

        assert!(matches!(result.outcome, Ok(CheckOutcome::IsaacNotFound)));
        assert_eq!(result.messages.last().map(String::as_str), Some("isaacNotFound"));
        assert!(!result.sent("Checking for the Steam path..."));
    }

    #[tokio::test]
    async fn logged_out_user_is_fatal() {
        let result = run(
            Scenario {
                active_user: "0x0",
                ..Scenario::default()
            },
            None,
        )
        .await;

        assert!(matches!(result.outcome, Err(ClientError::NotLoggedIn)));
        assert!(result.log.is_empty());
    }
}
