use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::error::{ClientError, ClientResult};

/// The two values the startup checks need from Steam's registry keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryValue {
    /// `HKCU\Software\Valve\Steam\SteamPath`
    SteamPath,
    /// `HKCU\Software\Valve\Steam\ActiveProcess\ActiveUser`
    ActiveUser,
}

impl RegistryValue {
    pub fn key_path(self) -> &'static str {
        match self {
            RegistryValue::SteamPath => r"Software\Valve\Steam",
            RegistryValue::ActiveUser => r"Software\Valve\Steam\ActiveProcess",
        }
    }

    pub fn value_name(self) -> &'static str {
        match self {
            RegistryValue::SteamPath => "SteamPath",
            RegistryValue::ActiveUser => "ActiveUser",
        }
    }
}

/// Read access to the platform's per-user registry namespace.
///
/// Values come back as text; `ActiveUser` is hex-encoded.
#[async_trait]
pub trait PlatformRegistry: Send + Sync {
    async fn read(&self, value: RegistryValue) -> ClientResult<String>;
}

/// Validate the install path read from the registry.
pub fn parse_platform_path(raw: &str) -> ClientResult<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClientError::BlankRegistryValue("Steam path"));
    }
    Ok(PathBuf::from(trimmed))
}

/// Parse the hex-encoded active user id. Zero means nobody is logged in.
pub fn parse_active_user(raw: &str) -> ClientResult<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClientError::BlankRegistryValue("Steam active user ID"));
    }

    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let user = u32::from_str_radix(digits, 16)
        .map_err(|_| ClientError::InvalidActiveUser(trimmed.to_string()))?;

    if user == 0 {
        return Err(ClientError::NotLoggedIn);
    }
    Ok(user)
}

#[cfg(windows)]
pub use windows_registry::WindowsRegistry;

#[cfg(windows)]
mod windows_registry {
    use async_trait::async_trait;
    use winreg::enums::HKEY_CURRENT_USER;
    use winreg::RegKey;

    use super::{PlatformRegistry, RegistryValue};
    use crate::core::error::{ClientError, ClientResult};

    /// `HKEY_CURRENT_USER` through winreg.
    #[derive(Debug, Default)]
    pub struct WindowsRegistry;

    #[async_trait]
    impl PlatformRegistry for WindowsRegistry {
        async fn read(&self, value: RegistryValue) -> ClientResult<String> {
            tokio::task::spawn_blocking(move || read_blocking(value))
                .await
                .map_err(|e| ClientError::Registry {
                    value: value.value_name(),
                    reason: e.to_string(),
                })?
        }
    }

    fn read_blocking(value: RegistryValue) -> ClientResult<String> {
        let reason = |e: std::io::Error| ClientError::Registry {
            value: value.value_name(),
            reason: e.to_string(),
        };

        let key = RegKey::predef(HKEY_CURRENT_USER)
            .open_subkey(value.key_path())
            .map_err(reason)?;
        match value {
            RegistryValue::SteamPath => key.get_value::<String, _>(value.value_name()),
            RegistryValue::ActiveUser => key
                .get_value::<u32, _>(value.value_name())
                .map(|id| format!("0x{id:x}")),
        }
        .map_err(reason)
    }
}

/// Stand-in for operating systems without a Steam registry.
#[cfg(not(windows))]
#[derive(Debug, Default)]
pub struct UnsupportedRegistry;

#[cfg(not(windows))]
#[async_trait]
impl PlatformRegistry for UnsupportedRegistry {
    async fn read(&self, _value: RegistryValue) -> ClientResult<String> {
        Err(ClientError::RegistryUnavailable)
    }
}

/// The registry implementation for the current operating system.
pub fn system_registry() -> std::sync::Arc<dyn PlatformRegistry> {
    #[cfg(windows)]
    {
        std::sync::Arc::new(WindowsRegistry)
    }
    #[cfg(not(windows))]
    {
        std::sync::Arc::new(UnsupportedRegistry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_path_is_trimmed() {
        assert_eq!(
            parse_platform_path("  c:/program files (x86)/steam \r\n").unwrap(),
            PathBuf::from("c:/program files (x86)/steam")
        );
    }

    #[test]
    fn blank_platform_path_is_fatal() {
        assert!(matches!(
            parse_platform_path("   "),
            Err(ClientError::BlankRegistryValue(_))
        ));
    }

    #[test]
    fn active_user_is_hex() {
        assert_eq!(parse_active_user("0x1a2b3c").unwrap(), 0x1a2b3c);
        assert_eq!(parse_active_user("1A2B3C").unwrap(), 0x1a2b3c);
    }

    #[test]
    fn zero_user_means_not_logged_in() {
        assert!(matches!(
            parse_active_user("0x0"),
            Err(ClientError::NotLoggedIn)
        ));
    }

    #[test]
    fn garbage_user_is_unparsable() {
        assert!(matches!(
            parse_active_user("steam"),
            Err(ClientError::InvalidActiveUser(_))
        ));
        assert!(matches!(
            parse_active_user(""),
            Err(ClientError::BlankRegistryValue(_))
        ));
    }
}
