//! Backend contract for pad handlers
//!
//! Every input backend the pad thread can drive implements [`PadHandler`].
//! The pad thread only ever calls through this trait; how a backend talks to
//! its devices is its own business.

use super::error::PadError;
use super::keyboard_handler::GuiContext;
use super::pad_state::Pad;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Backend selector read from an input profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Null,
    Keyboard,
    /// DualShock 3 over HID
    Ds3,
    /// DualShock 4 over HID
    Ds4,
    XInput,
    MmJoystick,
    Evdev,
}

impl Display for HandlerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Null => write!(f, "Null"),
            HandlerKind::Keyboard => write!(f, "Keyboard"),
            HandlerKind::Ds3 => write!(f, "DualShock 3"),
            HandlerKind::Ds4 => write!(f, "DualShock 4"),
            HandlerKind::XInput => write!(f, "XInput"),
            HandlerKind::MmJoystick => write!(f, "MMJoystick"),
            HandlerKind::Evdev => write!(f, "Evdev"),
        }
    }
}

/// Capability interface of an input backend
///
/// One instance of a backend may serve several ports. Implementations must
/// never block in [`poll`](PadHandler::poll) and must never panic across the
/// trait boundary; internal failures are logged and degrade to "no input".
pub trait PadHandler: Send {
    fn kind(&self) -> HandlerKind;

    /// Prepares internal resources. Calling it again is a no-op.
    fn init(&mut self);

    /// Claims the device named `device` for `pad`.
    ///
    /// On error the backend keeps no reference to `pad` and other ports
    /// bound to this backend are unaffected.
    fn bind_pad_to_device(&mut self, pad: Arc<Pad>, device: &str) -> Result<(), PadError>;

    /// One non-blocking unit of work: read device state into the bound pads
    /// and forward pending rumble values.
    fn poll(&mut self);

    /// Number of bound pads whose device is currently connected
    fn connected(&self) -> u32;

    /// Hand-off of the GUI context for backends that read input from a window.
    fn attach_gui(&mut self, _gui: &GuiContext) {}
}

/// Constructs backend instances by kind
///
/// Returns `None` for kinds this build cannot provide.
pub trait HandlerFactory: Send {
    fn create(&self, kind: HandlerKind) -> Option<Box<dyn PadHandler>>;
}

impl<F> HandlerFactory for F
where
    F: Fn(HandlerKind) -> Option<Box<dyn PadHandler>> + Send,
{
    fn create(&self, kind: HandlerKind) -> Option<Box<dyn PadHandler>> {
        self(kind)
    }
}
