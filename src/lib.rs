//! Controller port runtime
//!
//! Binds physical input devices to the logical controller ports of a virtual
//! console and polls them on a dedicated thread. See [`pad`] for the moving
//! parts and [`config`] for the input profiles that drive them.

pub mod config;
pub mod pad;

pub use config::{ConfigSource, InputConfig, PlayerConfig, TomlConfigSource};
pub use pad::{PadControl, PadError, PadThread, PadThreadSettings};
