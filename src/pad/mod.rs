//! Pad subsystem: controller ports and the backends that feed them
//!
//! Components, leaves first:
//!
//! 1. [`pad_state`] - per-port state and the aggregate info block
//! 2. [`handler`] - the backend contract, plus the null, keyboard and gilrs backends
//! 3. [`registry`] - one live backend per kind, rebuilt on reconfiguration
//! 4. [`pad_thread`] - reconfiguration, the polling loop and the control surface
//!
//! # Architecture
//!
//! ```text
//!               reset / enable / rumble / intercept
//! PadControl ─────────────────────────────────────────┐
//!                                                     ▼
//! InputConfig ──► Reconfiguration ──► HandlerRegistry ──poll──► Pad[0..7]
//!                  (pad thread)          │                        │
//!                                        └──connected──► PadInfo ◄┘
//! ```

pub mod error;
#[cfg(any(target_os = "linux", target_os = "windows"))]
pub mod gilrs_handler;
pub mod handler;
pub mod keyboard_handler;
pub mod null_handler;
pub mod pad_state;
pub mod pad_thread;
pub mod registry;

pub use error::PadError;
pub use handler::{HandlerFactory, HandlerKind, PadHandler};
pub use keyboard_handler::{GuiContext, KEYBOARD_DEVICE};
pub use null_handler::{NullPadHandler, NULL_DEVICE};
pub use pad_state::{Pad, PadInfo, PadSetting, VibrateMotor, MAX_PORTS};
pub use pad_thread::{LoopState, PadBackends, PadControl, PadThread, PadThreadSettings};
pub use registry::{HandlerRegistry, PlatformHandlerFactory};
