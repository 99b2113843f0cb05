//! Configuration file – reads/writes `~/.echohand/config.toml`.
//!
//! The file holds a [`GloveConfig`]; missing fields take their defaults.
//! `ECHOHAND_*` environment variables override the file, and command-line
//! flags override both.

use echohand_runtime::config::{GloveConfig, LinkKind, WireFormat};
use std::fs;
use std::path::{Path, PathBuf};

/// Return the path to `~/.echohand/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".echohand").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<GloveConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: GloveConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Load `path` (or the default location), fall back to defaults when the
/// file is absent, then apply environment overrides.
pub fn resolve(path: Option<&Path>) -> Result<GloveConfig, String> {
    let default_path = config_path();
    let path = path.unwrap_or(default_path.as_path());
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.validate().map_err(|e| e.to_string())?;
    Ok(cfg)
}

/// Apply `ECHOHAND_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `ECHOHAND_SERIAL_PORT` | `link.serial.port` (also selects the serial link) |
/// | `ECHOHAND_BAUD` | `link.serial.baud` |
/// | `ECHOHAND_TCP_ADDR` | `link.tcp_addr` |
/// | `ECHOHAND_WIRE` | `link.wire` (`ascii` / `binary`) |
/// | `ECHOHAND_DEBUG` | `debug.enabled` (`1` / `true` / `0` / `false`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut GloveConfig) {
    if let Ok(v) = std::env::var("ECHOHAND_SERIAL_PORT") {
        cfg.link.serial.port = v;
        cfg.link.kind = LinkKind::Serial;
    }
    if let Ok(v) = std::env::var("ECHOHAND_BAUD")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.link.serial.baud = baud;
    }
    if let Ok(v) = std::env::var("ECHOHAND_TCP_ADDR") {
        cfg.link.tcp_addr = v;
    }
    if let Ok(v) = std::env::var("ECHOHAND_WIRE") {
        match v.to_ascii_lowercase().as_str() {
            "ascii" => cfg.link.wire = WireFormat::Ascii,
            "binary" => cfg.link.wire = WireFormat::Binary,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("ECHOHAND_DEBUG") {
        match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "on" => cfg.debug.enabled = true,
            "0" | "false" | "off" => cfg.debug.enabled = false,
            _ => {}
        }
    }
}

/// Save the config to a specific path, creating its directory if needed.
pub fn save_to(cfg: &GloveConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // The directory may name serial devices; keep it owner-only on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
