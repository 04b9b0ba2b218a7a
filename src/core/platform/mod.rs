pub mod launch_options;
pub mod registry;
pub mod vdf;

pub use launch_options::{LaunchConfigManager, LaunchOptionStore, LocalConfigStore};
pub use registry::{
    parse_active_user, parse_platform_path, system_registry, PlatformRegistry, RegistryValue,
};
