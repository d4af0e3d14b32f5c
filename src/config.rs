//! Input profiles
//!
//! A profile assigns every controller port a backend kind and a device name.
//! Profiles are TOML files keyed by session id:
//!
//! ```toml
//! [[player]]
//! handler = "keyboard"
//! device = "Keyboard"
//!
//! [[player]]
//! handler = "evdev"
//! device = "Wireless Controller"
//! ```
//!
//! Lookup order is `<dir>/<session>.toml`, then `<dir>/default.toml`, then
//! the built-in profile with every port on the null backend.

use crate::pad::handler::HandlerKind;
use crate::pad::null_handler::NULL_DEVICE;
use crate::pad::pad_state::MAX_PORTS;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEFAULT_PROFILE: &str = "default";
const PROFILE_EXTENSION: &str = "toml";

fn default_device() -> String {
    NULL_DEVICE.to_string()
}

/// Backend and device for one port
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PlayerConfig {
    #[serde(default)]
    pub handler: HandlerKind,
    #[serde(default = "default_device")]
    pub device: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            handler: HandlerKind::Null,
            device: default_device(),
        }
    }
}

/// Profile for all ports; always holds exactly [`MAX_PORTS`] players
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct InputConfig {
    #[serde(default)]
    player: Vec<PlayerConfig>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            player: vec![PlayerConfig::default(); MAX_PORTS],
        }
    }
}

impl InputConfig {
    /// Builds a profile from the given players, filling missing ports with
    /// null players and dropping the surplus.
    pub fn from_players(players: Vec<PlayerConfig>) -> Self {
        Self { player: players }.normalized()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: InputConfig =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse input profile: {}", e))?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.player.len() > MAX_PORTS {
            warn!(
                "Input profile lists {} players, ignoring all past {}",
                self.player.len(),
                MAX_PORTS
            );
        }
        self.player.resize(MAX_PORTS, PlayerConfig::default());
        self
    }

    /// Player for `port`; out-of-range ports get the null player
    pub fn player(&self, port: usize) -> PlayerConfig {
        self.player.get(port).cloned().unwrap_or_default()
    }

    pub fn players(&self) -> &[PlayerConfig] {
        &self.player
    }
}

/// Supplies the input profile for a session
pub trait ConfigSource: Send {
    fn load(&self, session: &str) -> Result<InputConfig>;
}

impl ConfigSource for InputConfig {
    fn load(&self, _session: &str) -> Result<InputConfig> {
        Ok(self.clone())
    }
}

impl<F> ConfigSource for F
where
    F: Fn(&str) -> Result<InputConfig> + Send,
{
    fn load(&self, session: &str) -> Result<InputConfig> {
        self(session)
    }
}

/// Reads profiles from a directory of TOML files
#[derive(Debug, Clone)]
pub struct TomlConfigSource {
    dir: PathBuf,
}

impl TomlConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<config dir>/padhub/input`, or a relative `input` directory if the
    /// platform has no config dir
    pub fn from_default_dir() -> Self {
        let dir = dirs::config_dir()
            .map(|mut path| {
                path.push("padhub");
                path.push("input");
                path
            })
            .unwrap_or_else(|| PathBuf::from("input"));
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn profile_path(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return None;
        }
        Some(self.dir.join(format!("{name}.{PROFILE_EXTENSION}")))
    }

    fn read_profile(path: &Path) -> Result<InputConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
        InputConfig::from_toml(&content)
    }
}

impl ConfigSource for TomlConfigSource {
    fn load(&self, session: &str) -> Result<InputConfig> {
        if let Some(path) = self.profile_path(session).filter(|p| p.is_file()) {
            info!("Loading input profile for session '{}'", session);
            return Self::read_profile(&path);
        }

        if let Some(path) = self.profile_path(DEFAULT_PROFILE).filter(|p| p.is_file()) {
            debug!(
                "No profile for session '{}', using {}",
                session,
                path.display()
            );
            return Self::read_profile(&path);
        }

        warn!(
            "No input profile found in {}, all ports use the null handler",
            self.dir.display()
        );
        Ok(InputConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TWO_PLAYERS: &str = r#"
        [[player]]
        handler = "keyboard"
        device = "Keyboard"

        [[player]]
        handler = "evdev"
        device = "Wireless Controller"
    "#;

    #[test]
    fn parse_fills_missing_players_with_null() {
        let config = InputConfig::from_toml(TWO_PLAYERS).unwrap();

        assert_eq!(config.players().len(), MAX_PORTS);
        assert_eq!(config.player(0).handler, HandlerKind::Keyboard);
        assert_eq!(config.player(1).device, "Wireless Controller");
        assert_eq!(config.player(6), PlayerConfig::default());
        assert_eq!(config.player(42), PlayerConfig::default());
    }

    #[test]
    fn surplus_players_are_dropped() {
        let config = InputConfig::from_players(vec![
            PlayerConfig {
                handler: HandlerKind::Ds4,
                device: "pad".into(),
            };
            MAX_PORTS + 3
        ]);
        assert_eq!(config.players().len(), MAX_PORTS);
    }

    #[test]
    fn unknown_handler_is_a_parse_error() {
        let result = InputConfig::from_toml("[[player]]\nhandler = \"joycon\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn session_profile_wins_over_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("BLUS30443.toml"), TWO_PLAYERS).unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[[player]]\nhandler = \"xinput\"\ndevice = \"XInput Pad #1\"\n",
        )
        .unwrap();
        let source = TomlConfigSource::new(dir.path());

        let session = source.load("BLUS30443").unwrap();
        assert_eq!(session.player(0).handler, HandlerKind::Keyboard);

        let fallback = source.load("NPEB00001").unwrap();
        assert_eq!(fallback.player(0).handler, HandlerKind::XInput);
    }

    #[test]
    fn missing_directory_yields_null_profile() {
        let dir = tempfile::tempdir().unwrap();
        let source = TomlConfigSource::new(dir.path().join("does-not-exist"));
        assert_eq!(source.load("anything").unwrap(), InputConfig::default());
    }

    #[test]
    fn path_like_sessions_do_not_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("input");
        fs::create_dir(&inner).unwrap();
        fs::write(dir.path().join("secret.toml"), TWO_PLAYERS).unwrap();
        fs::write(dir.path().join("input.toml"), TWO_PLAYERS).unwrap();

        let source = TomlConfigSource::new(&inner);
        assert_eq!(source.load("../secret").unwrap(), InputConfig::default());
        assert_eq!(source.load(".").unwrap(), InputConfig::default());
        assert_eq!(source.load("..").unwrap(), InputConfig::default());
    }

    #[test]
    fn dotted_session_keeps_its_full_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("BLUS.toml"), TWO_PLAYERS).unwrap();
        let source = TomlConfigSource::new(dir.path());

        assert_eq!(source.load("BLUS.30443").unwrap(), InputConfig::default());

        fs::write(
            dir.path().join("BLUS.30443.toml"),
            "[[player]]\nhandler = \"evdev\"\ndevice = \"Gamepad 0\"\n",
        )
        .unwrap();
        assert_eq!(
            source.load("BLUS.30443").unwrap().player(0).handler,
            HandlerKind::Evdev
        );
    }

    #[test]
    fn broken_session_profile_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.toml"), "[[player]\n").unwrap();
        let source = TomlConfigSource::new(dir.path());
        assert!(source.load("broken").is_err());
    }
}
