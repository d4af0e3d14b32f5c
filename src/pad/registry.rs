//! Per-reconfiguration cache of live backends
//!
//! Holds at most one instance per [`HandlerKind`]. Ports configured for the
//! same kind share that instance. The registry is rebuilt from empty on every
//! reconfiguration and iterated in insertion order when polling.

#[cfg(any(target_os = "linux", target_os = "windows"))]
use super::gilrs_handler::GilrsPadHandler;
use super::handler::{HandlerFactory, HandlerKind, PadHandler};
use super::keyboard_handler::{GuiContext, KeyboardPadHandler};
use super::null_handler::NullPadHandler;
use tracing::{debug, warn};

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn PadHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn contains(&self, kind: HandlerKind) -> bool {
        self.position(kind).is_some()
    }

    /// Kinds in insertion order
    pub fn kinds(&self) -> Vec<HandlerKind> {
        self.handlers.iter().map(|h| h.kind()).collect()
    }

    fn position(&self, kind: HandlerKind) -> Option<usize> {
        self.handlers.iter().position(|h| h.kind() == kind)
    }

    /// Registers an already initialized handler, replacing one of the same kind
    pub fn insert(&mut self, handler: Box<dyn PadHandler>) {
        match self.position(handler.kind()) {
            Some(index) => {
                warn!("Replacing live {} handler", handler.kind());
                self.handlers[index] = handler;
            }
            None => self.handlers.push(handler),
        }
    }

    pub fn get_mut(&mut self, kind: HandlerKind) -> Option<&mut (dyn PadHandler + 'static)> {
        let index = self.position(kind)?;
        Some(self.handlers[index].as_mut())
    }

    /// Returns the live handler for `kind`, creating and initializing it first
    /// if needed. A new keyboard handler is attached to `gui` before init.
    ///
    /// Returns `None` if `factory` cannot provide `kind`.
    pub fn get_or_create(
        &mut self,
        kind: HandlerKind,
        factory: &dyn HandlerFactory,
        gui: Option<&GuiContext>,
    ) -> Option<&mut (dyn PadHandler + 'static)> {
        if let Some(index) = self.position(kind) {
            return Some(self.handlers[index].as_mut());
        }

        let mut handler = factory.create(kind)?;
        debug!("Created {} handler", kind);
        if kind == HandlerKind::Keyboard {
            if let Some(gui) = gui {
                handler.attach_gui(gui);
            }
        }
        handler.init();
        self.handlers.push(handler);
        self.handlers.last_mut().map(|h| h.as_mut())
    }

    /// Polls every handler once, in insertion order, and returns the summed
    /// connected count.
    pub fn poll_all(&mut self) -> u32 {
        let mut connected = 0;
        for handler in &mut self.handlers {
            handler.poll();
            connected += handler.connected();
        }
        connected
    }
}

/// Backends compiled into this build
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformHandlerFactory;

impl HandlerFactory for PlatformHandlerFactory {
    fn create(&self, kind: HandlerKind) -> Option<Box<dyn PadHandler>> {
        match kind {
            HandlerKind::Null => Some(Box::new(NullPadHandler::new())),
            HandlerKind::Keyboard => Some(Box::new(KeyboardPadHandler::new())),
            #[cfg(target_os = "linux")]
            HandlerKind::Evdev => Some(Box::new(GilrsPadHandler::new(kind))),
            #[cfg(target_os = "windows")]
            HandlerKind::XInput | HandlerKind::MmJoystick => {
                Some(Box::new(GilrsPadHandler::new(kind)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::error::PadError;
    use crate::pad::keyboard_handler::KEYBOARD_DEVICE;
    use crate::pad::pad_state::{Pad, PadSetting};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        kind: HandlerKind,
        inits: Arc<AtomicUsize>,
        polls: Arc<AtomicUsize>,
        connected: u32,
    }

    impl PadHandler for CountingHandler {
        fn kind(&self) -> HandlerKind {
            self.kind
        }

        fn init(&mut self) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn bind_pad_to_device(&mut self, _pad: Arc<Pad>, _device: &str) -> Result<(), PadError> {
            Ok(())
        }

        fn poll(&mut self) {
            self.polls.fetch_add(1, Ordering::SeqCst);
        }

        fn connected(&self) -> u32 {
            self.connected
        }
    }

    fn counting_factory(
        created: Arc<AtomicUsize>,
        inits: Arc<AtomicUsize>,
        polls: Arc<AtomicUsize>,
    ) -> impl HandlerFactory {
        move |kind: HandlerKind| -> Option<Box<dyn PadHandler>> {
            if kind == HandlerKind::Ds3 {
                return None;
            }
            created.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(CountingHandler {
                kind,
                inits: inits.clone(),
                polls: polls.clone(),
                connected: 1,
            }))
        }
    }

    #[test]
    fn get_or_create_shares_one_instance_per_kind() {
        let created = Arc::new(AtomicUsize::new(0));
        let inits = Arc::new(AtomicUsize::new(0));
        let polls = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(created.clone(), inits.clone(), polls.clone());
        let mut registry = HandlerRegistry::new();

        for kind in [HandlerKind::Evdev, HandlerKind::Evdev, HandlerKind::Ds4, HandlerKind::Evdev] {
            assert!(registry.get_or_create(kind, &factory, None).is_some());
        }

        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(inits.load(Ordering::SeqCst), 2);
        assert_eq!(registry.kinds(), vec![HandlerKind::Evdev, HandlerKind::Ds4]);
    }

    #[test]
    fn unsupported_kind_is_not_registered() {
        let factory = counting_factory(
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        );
        let mut registry = HandlerRegistry::new();

        assert!(registry.get_or_create(HandlerKind::Ds3, &factory, None).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn poll_all_visits_every_handler_and_sums_connected() {
        let polls = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            polls.clone(),
        );
        let mut registry = HandlerRegistry::new();
        registry.insert(Box::new(NullPadHandler::new()));
        registry.get_or_create(HandlerKind::Evdev, &factory, None);
        registry.get_or_create(HandlerKind::XInput, &factory, None);

        assert_eq!(registry.poll_all(), 2);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(
            registry.kinds(),
            vec![HandlerKind::Null, HandlerKind::Evdev, HandlerKind::XInput]
        );

        registry.clear();
        assert_eq!(registry.poll_all(), 0);
    }

    #[test]
    fn new_keyboard_handler_receives_gui_context() {
        let gui = GuiContext::current(egui::ViewportId::ROOT);
        let mut registry = HandlerRegistry::new();
        let pad = Arc::new(Pad::from_setting(&PadSetting::default()));

        let keyboard = registry
            .get_or_create(HandlerKind::Keyboard, &PlatformHandlerFactory, Some(&gui))
            .expect("keyboard is always available");
        assert!(keyboard.bind_pad_to_device(pad, KEYBOARD_DEVICE).is_ok());
    }

    #[test]
    fn platform_factory_never_provides_hid_kinds() {
        assert!(PlatformHandlerFactory.create(HandlerKind::Ds3).is_none());
        assert!(PlatformHandlerFactory.create(HandlerKind::Ds4).is_none());
        assert!(PlatformHandlerFactory.create(HandlerKind::Null).is_some());
    }
}
