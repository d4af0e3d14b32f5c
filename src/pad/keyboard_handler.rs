//! Keyboard backend fed from the GUI's event loop
//!
//! Key events are captured by the GUI (egui) and forwarded through a
//! [`GuiContext`]. The pad thread hands that context to the keyboard backend
//! once, when the backend is constructed; afterwards the backend drains the
//! forwarded events on every poll and folds them into its bound pads.
//!
//! ```text
//! GUI thread ──[egui::Event]──► GuiContext ──poll──► KeyboardPadHandler ──► Pad
//! ```

use super::error::PadError;
use super::handler::{HandlerKind, PadHandler};
use super::pad_state::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// The only device name the keyboard backend answers to
pub const KEYBOARD_DEVICE: &str = "Keyboard";

// Oldest events are dropped past this
const MAX_QUEUED_EVENTS: usize = 256;

/// GUI thread and window the keyboard backend reads input from
#[derive(Clone, Debug)]
pub struct GuiContext {
    thread: std::thread::Thread,
    viewport: egui::ViewportId,
    events: Arc<Mutex<VecDeque<egui::Event>>>,
}

impl GuiContext {
    /// Context bound to the calling thread, which is expected to be the GUI thread
    pub fn current(viewport: egui::ViewportId) -> Self {
        Self {
            thread: std::thread::current(),
            viewport,
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn thread(&self) -> &std::thread::Thread {
        &self.thread
    }

    pub fn viewport(&self) -> egui::ViewportId {
        self.viewport
    }

    /// Forward key events from the GUI. Non-key events are ignored.
    pub fn forward_events<'a>(&self, events: impl IntoIterator<Item = &'a egui::Event>) {
        let mut queue = self.events.lock().unwrap_or_else(|e| e.into_inner());
        for event in events {
            if let egui::Event::Key { .. } = event {
                if queue.len() == MAX_QUEUED_EVENTS {
                    queue.pop_front();
                }
                queue.push_back(event.clone());
            }
        }
    }

    fn drain(&self) -> Vec<egui::Event> {
        let mut queue = self.events.lock().unwrap_or_else(|e| e.into_inner());
        queue.drain(..).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyTarget {
    Button(DigitalWord, u16),
    Stick(StickAxis, u8),
}

fn default_key_map() -> HashMap<egui::Key, KeyTarget> {
    use egui::Key;
    use DigitalWord::{First, Second};
    use KeyTarget::{Button, Stick};

    HashMap::from([
        (Key::ArrowUp, Button(First, CTRL_UP)),
        (Key::ArrowDown, Button(First, CTRL_DOWN)),
        (Key::ArrowLeft, Button(First, CTRL_LEFT)),
        (Key::ArrowRight, Button(First, CTRL_RIGHT)),
        (Key::Enter, Button(First, CTRL_START)),
        (Key::Space, Button(First, CTRL_SELECT)),
        (Key::F, Button(First, CTRL_L3)),
        (Key::G, Button(First, CTRL_R3)),
        (Key::Z, Button(Second, CTRL_CROSS)),
        (Key::X, Button(Second, CTRL_CIRCLE)),
        (Key::C, Button(Second, CTRL_SQUARE)),
        (Key::V, Button(Second, CTRL_TRIANGLE)),
        (Key::Q, Button(Second, CTRL_L1)),
        (Key::E, Button(Second, CTRL_R1)),
        (Key::Num1, Button(Second, CTRL_L2)),
        (Key::Num3, Button(Second, CTRL_R2)),
        (Key::A, Stick(StickAxis::LeftX, 0x00)),
        (Key::D, Stick(StickAxis::LeftX, 0xFF)),
        (Key::W, Stick(StickAxis::LeftY, 0x00)),
        (Key::S, Stick(StickAxis::LeftY, 0xFF)),
        (Key::J, Stick(StickAxis::RightX, 0x00)),
        (Key::L, Stick(StickAxis::RightX, 0xFF)),
        (Key::I, Stick(StickAxis::RightY, 0x00)),
        (Key::K, Stick(StickAxis::RightY, 0xFF)),
    ])
}

/// Keyboard backend; every bound pad mirrors the same keyboard
pub struct KeyboardPadHandler {
    gui: Option<GuiContext>,
    key_map: HashMap<egui::Key, KeyTarget>,
    bindings: Vec<Arc<Pad>>,
}

impl KeyboardPadHandler {
    pub fn new() -> Self {
        Self {
            gui: None,
            key_map: default_key_map(),
            bindings: Vec::new(),
        }
    }

    fn apply_key(&self, key: egui::Key, pressed: bool) {
        let Some(target) = self.key_map.get(&key) else {
            debug!("Unmapped key {:?}", key);
            return;
        };
        for pad in &self.bindings {
            match *target {
                KeyTarget::Button(word, mask) => pad.set_button(word, mask, pressed),
                KeyTarget::Stick(axis, value) => {
                    pad.set_stick(axis, if pressed { value } else { STICK_CENTER })
                }
            }
        }
    }
}

impl Default for KeyboardPadHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PadHandler for KeyboardPadHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Keyboard
    }

    fn init(&mut self) {}

    fn bind_pad_to_device(&mut self, pad: Arc<Pad>, device: &str) -> Result<(), PadError> {
        if device != KEYBOARD_DEVICE {
            return Err(PadError::UnknownDevice(device.to_string()));
        }
        if self.gui.is_none() {
            return Err(PadError::BackendInit(
                "no GUI context to read keys from".to_string(),
            ));
        }
        self.bindings.push(pad);
        Ok(())
    }

    fn poll(&mut self) {
        let Some(gui) = &self.gui else {
            return;
        };
        for pad in &self.bindings {
            pad.set_connected(true);
        }
        for event in gui.drain() {
            if let egui::Event::Key {
                key,
                pressed,
                repeat,
                ..
            } = event
            {
                if !repeat {
                    self.apply_key(key, pressed);
                }
            }
        }
    }

    fn connected(&self) -> u32 {
        if self.gui.is_some() {
            self.bindings.len() as u32
        } else {
            0
        }
    }

    fn attach_gui(&mut self, gui: &GuiContext) {
        if self.gui.is_some() {
            warn!("Keyboard handler already attached to a GUI context");
            return;
        }
        info!(
            "Keyboard handler attached to GUI thread {:?} ({:?})",
            gui.thread().name().unwrap_or("<unnamed>"),
            gui.viewport()
        );
        self.gui = Some(gui.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(key: egui::Key, pressed: bool) -> egui::Event {
        egui::Event::Key {
            key,
            physical_key: None,
            pressed,
            repeat: false,
            modifiers: egui::Modifiers::NONE,
        }
    }

    fn fresh_pad() -> Arc<Pad> {
        Arc::new(Pad::from_setting(&PadSetting::default()))
    }

    #[test]
    fn bind_requires_keyboard_device_and_gui() {
        let mut handler = KeyboardPadHandler::new();
        assert!(matches!(
            handler.bind_pad_to_device(fresh_pad(), KEYBOARD_DEVICE),
            Err(PadError::BackendInit(_))
        ));

        handler.attach_gui(&GuiContext::current(egui::ViewportId::ROOT));
        assert!(matches!(
            handler.bind_pad_to_device(fresh_pad(), "Wireless Controller"),
            Err(PadError::UnknownDevice(_))
        ));
        assert!(handler
            .bind_pad_to_device(fresh_pad(), KEYBOARD_DEVICE)
            .is_ok());
        assert_eq!(handler.connected(), 1);
    }

    #[test]
    fn forwarded_keys_reach_bound_pads() {
        let gui = GuiContext::current(egui::ViewportId::ROOT);
        let mut handler = KeyboardPadHandler::new();
        handler.attach_gui(&gui);

        let first = fresh_pad();
        let second = fresh_pad();
        handler
            .bind_pad_to_device(first.clone(), KEYBOARD_DEVICE)
            .unwrap();
        handler
            .bind_pad_to_device(second.clone(), KEYBOARD_DEVICE)
            .unwrap();

        gui.forward_events(&[
            key_event(egui::Key::Z, true),
            key_event(egui::Key::Enter, true),
            key_event(egui::Key::D, true),
            egui::Event::Text("z".to_string()),
        ]);
        handler.poll();

        for pad in [&first, &second] {
            assert!(pad.is_connected());
            assert_eq!(pad.digital(DigitalWord::First), CTRL_START);
            assert_eq!(pad.digital(DigitalWord::Second), CTRL_CROSS);
            assert_eq!(pad.stick(StickAxis::LeftX), 0xFF);
        }

        gui.forward_events(&[key_event(egui::Key::D, false), key_event(egui::Key::Z, false)]);
        handler.poll();
        assert_eq!(first.stick(StickAxis::LeftX), STICK_CENTER);
        assert_eq!(first.digital(DigitalWord::Second), 0);
    }

    #[test]
    fn event_queue_is_bounded() {
        let gui = GuiContext::current(egui::ViewportId::ROOT);
        let events: Vec<_> = (0..MAX_QUEUED_EVENTS + 10)
            .map(|i| key_event(egui::Key::Z, i % 2 == 0))
            .collect();
        gui.forward_events(&events);
        assert_eq!(gui.drain().len(), MAX_QUEUED_EVENTS);
    }
}
