//! Generic gamepad backend on top of gilrs
//!
//! Serves the joystick-API handler kinds (evdev on Linux, XInput and
//! MMJoystick on Windows). Devices are claimed by gamepad name, or by
//! `"Gamepad <id>"` for setups with several identical controllers.

use super::error::PadError;
use super::handler::{HandlerKind, PadHandler};
use super::pad_state::*;
use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const DEFAULT_DEADZONE: f32 = 0.05;

struct GilrsBinding {
    pad: Arc<Pad>,
    device: String,
    gamepad: Option<GamepadId>,

    // Last motor values forwarded to the device
    rumble: (u8, u8),
    effect: Option<Effect>,
}

impl GilrsBinding {
    fn new(pad: Arc<Pad>, device: &str, gamepad: Option<GamepadId>) -> Self {
        Self {
            pad,
            device: device.to_string(),
            gamepad,
            rumble: (0, 0),
            effect: None,
        }
    }

    /// Drops the gamepad so a reconnect can claim this binding again
    fn release(&mut self) {
        self.pad.set_connected(false);
        self.gamepad = None;
        self.rumble = (0, 0);
        self.effect = None;
    }
}

/// `device` names a gamepad either by its name or as `"Gamepad <index>"`
fn device_matches(name: &str, index: usize, device: &str) -> bool {
    name == device || format!("Gamepad {}", index) == device
}

/// First released binding that asks for the given gamepad
fn reclaimable(bindings: &[GilrsBinding], name: &str, index: usize) -> Option<usize> {
    bindings
        .iter()
        .position(|b| b.gamepad.is_none() && device_matches(name, index, &b.device))
}

pub struct GilrsPadHandler {
    kind: HandlerKind,
    gilrs: Option<Gilrs>,
    bindings: Vec<GilrsBinding>,
    joystick_deadzone: f32,
}

impl GilrsPadHandler {
    pub fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            gilrs: None,
            bindings: Vec::new(),
            joystick_deadzone: DEFAULT_DEADZONE,
        }
    }

    fn handle_event(&mut self, id: GamepadId, event: EventType) {
        let deadzone = self.joystick_deadzone;
        let Some(binding) = self.bindings.iter_mut().find(|b| b.gamepad == Some(id)) else {
            debug!("Skipping event from unbound gamepad: {:?}", id);
            return;
        };
        let pad = &binding.pad;

        match event {
            EventType::ButtonPressed(button, _) => {
                if let Some((word, mask)) = map_button(button) {
                    pad.set_button(word, mask, true);
                }
            }
            EventType::ButtonReleased(button, _) => {
                if let Some((word, mask)) = map_button(button) {
                    pad.set_button(word, mask, false);
                }
            }
            EventType::AxisChanged(axis, value, _) => {
                let Some((stick, inverted)) = map_axis(axis) else {
                    debug!("Ignoring unsupported axis: {:?}", axis);
                    return;
                };
                let value = apply_deadzone(value, deadzone);
                let value = if inverted { -value } else { value };
                pad.set_stick(stick, axis_to_byte(value));
            }
            EventType::Disconnected => {
                warn!("Gamepad '{}' disconnected", binding.device);
                binding.release();
            }
            _ => {}
        }
    }

    /// Reattach bindings whose gamepad showed up after bind
    fn claim_connected(&mut self, id: GamepadId) {
        let Some(gilrs) = self.gilrs.as_ref() else {
            return;
        };
        if self.bindings.iter().any(|b| b.gamepad == Some(id)) {
            return;
        }
        let name = gilrs.gamepad(id).name().to_string();
        if let Some(slot) = reclaimable(&self.bindings, &name, usize::from(id)) {
            let binding = &mut self.bindings[slot];
            info!("Gamepad '{}' connected as {}", binding.device, id);
            binding.gamepad = Some(id);
        }
    }

    fn process_rumble(gilrs: &mut Gilrs, binding: &mut GilrsBinding) {
        let Some(id) = binding.gamepad else {
            return;
        };
        let motors = binding.pad.vibrate_motors();
        if motors.len() < 2 {
            return;
        }
        let requested = (motors[0].value(), motors[1].value());
        if requested == binding.rumble {
            return;
        }
        binding.rumble = requested;

        // Dropping the previous effect stops it
        binding.effect = None;
        if requested == (0, 0) || !gilrs.gamepad(id).is_ff_supported() {
            return;
        }

        let result = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind: BaseEffectType::Strong {
                    magnitude: u16::from(requested.0) * 257,
                },
                ..Default::default()
            })
            .add_effect(BaseEffect {
                kind: BaseEffectType::Weak {
                    magnitude: u16::from(requested.1) * 257,
                },
                ..Default::default()
            })
            .gamepads(&[id])
            .finish(gilrs);

        match result.and_then(|effect| effect.play().map(|_| effect)) {
            Ok(effect) => binding.effect = Some(effect),
            Err(e) => error!("Failed to play rumble on '{}': {}", binding.device, e),
        }
    }
}

impl PadHandler for GilrsPadHandler {
    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn init(&mut self) {
        if self.gilrs.is_some() {
            return;
        }
        info!("Initializing gilrs controller interface for {}", self.kind);
        match Gilrs::new() {
            Ok(gilrs) => {
                info!("Successfully initialized gilrs");
                self.gilrs = Some(gilrs);
            }
            Err(e) => error!("Failed to initialize gilrs: {}", e),
        }
    }

    fn bind_pad_to_device(&mut self, pad: Arc<Pad>, device: &str) -> Result<(), PadError> {
        let gilrs = self
            .gilrs
            .as_ref()
            .ok_or(PadError::NotInitialized(self.kind))?;

        let claimed: Vec<GamepadId> = self.bindings.iter().filter_map(|b| b.gamepad).collect();
        let (id, gamepad) = gilrs
            .gamepads()
            .find(|(id, gamepad)| {
                !claimed.contains(id) && device_matches(gamepad.name(), usize::from(*id), device)
            })
            .ok_or_else(|| PadError::UnknownDevice(device.to_string()))?;

        info!(
            "Bound gamepad {} ({}, UUID: {:?})",
            gamepad.name(),
            id,
            gamepad.uuid()
        );
        pad.install_motors(vec![VibrateMotor::new(true), VibrateMotor::new(false)]);
        self.bindings.push(GilrsBinding::new(pad, device, Some(id)));
        Ok(())
    }

    fn poll(&mut self) {
        let mut pending = Vec::new();
        if let Some(gilrs) = self.gilrs.as_mut() {
            while let Some(Event { id, event, .. }) = gilrs.next_event() {
                pending.push((id, event));
            }
        } else {
            return;
        }

        for (id, event) in pending {
            if let EventType::Connected = event {
                self.claim_connected(id);
            }
            self.handle_event(id, event);
        }

        let Some(gilrs) = self.gilrs.as_mut() else {
            return;
        };
        for binding in &mut self.bindings {
            let connected = binding
                .gamepad
                .and_then(|id| gilrs.connected_gamepad(id))
                .is_some();
            binding.pad.set_connected(connected);
            if connected {
                Self::process_rumble(gilrs, binding);
            }
        }
    }

    fn connected(&self) -> u32 {
        self.bindings.iter().filter(|b| b.pad.is_connected()).count() as u32
    }
}

fn map_button(button: Button) -> Option<(DigitalWord, u16)> {
    use DigitalWord::{First, Second};
    match button {
        Button::South => Some((Second, CTRL_CROSS)),
        Button::East => Some((Second, CTRL_CIRCLE)),
        Button::West => Some((Second, CTRL_SQUARE)),
        Button::North => Some((Second, CTRL_TRIANGLE)),
        Button::LeftTrigger => Some((Second, CTRL_L1)),
        Button::RightTrigger => Some((Second, CTRL_R1)),
        Button::LeftTrigger2 => Some((Second, CTRL_L2)),
        Button::RightTrigger2 => Some((Second, CTRL_R2)),
        Button::Start => Some((First, CTRL_START)),
        Button::Select => Some((First, CTRL_SELECT)),
        Button::LeftThumb => Some((First, CTRL_L3)),
        Button::RightThumb => Some((First, CTRL_R3)),
        Button::DPadUp => Some((First, CTRL_UP)),
        Button::DPadDown => Some((First, CTRL_DOWN)),
        Button::DPadLeft => Some((First, CTRL_LEFT)),
        Button::DPadRight => Some((First, CTRL_RIGHT)),
        _ => None,
    }
}

// gilrs reports "up" as positive, the pad expects 0x00 for up
fn map_axis(axis: Axis) -> Option<(StickAxis, bool)> {
    match axis {
        Axis::LeftStickX => Some((StickAxis::LeftX, false)),
        Axis::LeftStickY => Some((StickAxis::LeftY, true)),
        Axis::RightStickX => Some((StickAxis::RightX, false)),
        Axis::RightStickY => Some((StickAxis::RightY, true)),
        _ => None,
    }
}

fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale the value to the range outside the deadzone
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

fn axis_to_byte(value: f32) -> u8 {
    (((value.clamp(-1.0, 1.0) + 1.0) / 2.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadzone_zeroes_small_values_and_rescales_the_rest() {
        assert_eq!(apply_deadzone(0.04, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.04, 0.05), 0.0);
        assert!((apply_deadzone(1.0, 0.05) - 1.0).abs() < f32::EPSILON);
        assert!((apply_deadzone(-1.0, 0.05) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn axis_bytes_span_full_range() {
        assert_eq!(axis_to_byte(-1.0), 0x00);
        assert_eq!(axis_to_byte(0.0), STICK_CENTER);
        assert_eq!(axis_to_byte(1.0), 0xFF);
        assert_eq!(axis_to_byte(3.0), 0xFF);
    }

    #[test]
    fn face_buttons_land_in_second_word() {
        assert_eq!(
            map_button(Button::South),
            Some((DigitalWord::Second, CTRL_CROSS))
        );
        assert_eq!(
            map_button(Button::DPadLeft),
            Some((DigitalWord::First, CTRL_LEFT))
        );
        assert_eq!(map_button(Button::Mode), None);
    }

    #[test]
    fn devices_match_by_name_or_index() {
        assert!(device_matches("Wireless Controller", 3, "Wireless Controller"));
        assert!(device_matches("Wireless Controller", 3, "Gamepad 3"));
        assert!(!device_matches("Wireless Controller", 3, "Gamepad 1"));
        assert!(!device_matches("Xbox Controller", 0, "Wireless Controller"));
    }

    #[test]
    fn released_binding_is_reclaimed_on_reconnect() {
        let new_pad = || Arc::new(Pad::from_setting(&PadSetting::default()));
        let pad = new_pad();
        pad.set_connected(true);
        let mut bindings = vec![
            GilrsBinding::new(new_pad(), "Xbox Controller", None),
            GilrsBinding::new(pad.clone(), "Wireless Controller", None),
            GilrsBinding::new(new_pad(), "Gamepad 7", None),
        ];
        bindings[1].rumble = (0x40, 0x80);

        bindings[1].release();
        assert!(!pad.is_connected());
        assert_eq!(bindings[1].rumble, (0, 0));

        assert_eq!(reclaimable(&bindings, "Wireless Controller", 5), Some(1));
        assert_eq!(reclaimable(&bindings, "Unknown Pad", 7), Some(2));
        assert_eq!(reclaimable(&bindings, "Unknown Pad", 4), None);
    }

    #[test]
    fn bind_before_init_fails() {
        let mut handler = GilrsPadHandler::new(HandlerKind::Evdev);
        let pad = Arc::new(Pad::from_setting(&PadSetting::default()));
        assert!(matches!(
            handler.bind_pad_to_device(pad, "Wireless Controller"),
            Err(PadError::NotInitialized(HandlerKind::Evdev))
        ));
        assert_eq!(handler.connected(), 0);
    }
}
