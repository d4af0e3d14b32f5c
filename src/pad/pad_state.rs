//! Per-port pad state and the aggregate info block
//!
//! A [`Pad`] is shared between the pad thread (which owns it), the backend it
//! is bound to (which writes input into it every poll) and control threads
//! (which write rumble values). Every field is an atomic, so all of these
//! writers can touch a pad without a lock. Readers accept values from the
//! last tick.

use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};
use std::sync::OnceLock;

/// Maximum number of controller ports
pub const MAX_PORTS: usize = 7;

// Port status
pub const STATUS_DISCONNECTED: u32 = 0x0000_0000;
pub const STATUS_CONNECTED: u32 = 0x0000_0001;
pub const STATUS_ASSIGN_CHANGES: u32 = 0x0000_0002;

// Device capabilities
pub const CAPABILITY_PS3_CONFORMITY: u32 = 0x0000_0001;
pub const CAPABILITY_PRESS_MODE: u32 = 0x0000_0002;
pub const CAPABILITY_SENSOR_MODE: u32 = 0x0000_0004;
pub const CAPABILITY_HP_ANALOG_STICK: u32 = 0x0000_0008;
pub const CAPABILITY_ACTUATOR: u32 = 0x0000_0010;

pub const DEFAULT_CAPABILITY: u32 =
    CAPABILITY_PS3_CONFORMITY | CAPABILITY_PRESS_MODE | CAPABILITY_ACTUATOR;

// Device types
pub const DEV_TYPE_STANDARD: u32 = 0;
pub const DEV_TYPE_GUITAR: u32 = 4;
pub const DEV_TYPE_DRUM: u32 = 6;
pub const DEV_TYPE_DJ: u32 = 17;
pub const DEV_TYPE_DANCEMAT: u32 = 20;
pub const DEV_TYPE_NAVIGATION: u32 = 21;

// Session flags in the info block
pub const INFO_INTERCEPTED: u32 = 0x0000_0001;

// Digital button word 1
pub const CTRL_LEFT: u16 = 0x0080;
pub const CTRL_DOWN: u16 = 0x0040;
pub const CTRL_RIGHT: u16 = 0x0020;
pub const CTRL_UP: u16 = 0x0010;
pub const CTRL_START: u16 = 0x0008;
pub const CTRL_R3: u16 = 0x0004;
pub const CTRL_L3: u16 = 0x0002;
pub const CTRL_SELECT: u16 = 0x0001;

// Digital button word 2
pub const CTRL_SQUARE: u16 = 0x0080;
pub const CTRL_CROSS: u16 = 0x0040;
pub const CTRL_CIRCLE: u16 = 0x0020;
pub const CTRL_TRIANGLE: u16 = 0x0010;
pub const CTRL_R1: u16 = 0x0008;
pub const CTRL_L1: u16 = 0x0004;
pub const CTRL_R2: u16 = 0x0002;
pub const CTRL_L2: u16 = 0x0001;

/// Analog stick centre value
pub const STICK_CENTER: u8 = 0x80;

/// Index into the stick array of a [`Pad`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickAxis {
    LeftX = 0,
    LeftY = 1,
    RightX = 2,
    RightY = 3,
}

/// Which digital word a button lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalWord {
    First,
    Second,
}

/// One rumble channel
#[derive(Debug)]
pub struct VibrateMotor {
    pub is_large: bool,
    value: AtomicU8,
}

impl VibrateMotor {
    pub fn new(is_large: bool) -> Self {
        Self {
            is_large,
            value: AtomicU8::new(0),
        }
    }

    pub fn value(&self) -> u8 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn set_value(&self, value: u8) {
        self.value.store(value, Ordering::Relaxed);
    }
}

/// The settings of a port that survive a reconfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadSetting {
    pub port_status: u32,
    pub device_capability: u32,
    pub device_type: u32,
}

impl Default for PadSetting {
    /// Settings for a port that did not exist before
    fn default() -> Self {
        Self {
            port_status: STATUS_DISCONNECTED,
            device_capability: DEFAULT_CAPABILITY,
            device_type: DEV_TYPE_STANDARD,
        }
    }
}

/// State of one logical controller port
#[derive(Debug)]
pub struct Pad {
    port_status: AtomicU32,
    device_capability: AtomicU32,
    device_type: AtomicU32,

    digital_1: AtomicU16,
    digital_2: AtomicU16,
    sticks: [AtomicU8; 4],

    // Installed once by the backend during bind
    vibrate_motors: OnceLock<Vec<VibrateMotor>>,
}

impl Pad {
    pub fn new(port_status: u32, device_capability: u32, device_type: u32) -> Self {
        Self {
            port_status: AtomicU32::new(port_status),
            device_capability: AtomicU32::new(device_capability),
            device_type: AtomicU32::new(device_type),
            digital_1: AtomicU16::new(0),
            digital_2: AtomicU16::new(0),
            sticks: [
                AtomicU8::new(STICK_CENTER),
                AtomicU8::new(STICK_CENTER),
                AtomicU8::new(STICK_CENTER),
                AtomicU8::new(STICK_CENTER),
            ],
            vibrate_motors: OnceLock::new(),
        }
    }

    /// Fresh disconnected pad carrying the capability and device type of a snapshot
    pub fn from_setting(setting: &PadSetting) -> Self {
        Self::new(
            STATUS_DISCONNECTED,
            setting.device_capability,
            setting.device_type,
        )
    }

    pub fn setting(&self) -> PadSetting {
        PadSetting {
            port_status: self.port_status(),
            device_capability: self.device_capability(),
            device_type: self.device_type(),
        }
    }

    pub fn port_status(&self) -> u32 {
        self.port_status.load(Ordering::Relaxed)
    }

    pub fn set_port_status(&self, status: u32) {
        self.port_status.store(status, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.port_status() & STATUS_CONNECTED != 0
    }

    /// Records a device (dis)connect. A change sets the assign-changes bit,
    /// which stays set until the consumer acknowledges it.
    pub fn set_connected(&self, connected: bool) {
        if connected == self.is_connected() {
            return;
        }
        let status = self.port_status();
        let status = if connected {
            status | STATUS_CONNECTED | STATUS_ASSIGN_CHANGES
        } else {
            (status & !STATUS_CONNECTED) | STATUS_ASSIGN_CHANGES
        };
        self.set_port_status(status);
        if !connected {
            self.clear_input();
        }
    }

    pub fn acknowledge_assign_changes(&self) {
        self.port_status
            .fetch_and(!STATUS_ASSIGN_CHANGES, Ordering::Relaxed);
    }

    pub fn device_capability(&self) -> u32 {
        self.device_capability.load(Ordering::Relaxed)
    }

    pub fn set_device_capability(&self, capability: u32) {
        self.device_capability.store(capability, Ordering::Relaxed);
    }

    pub fn device_type(&self) -> u32 {
        self.device_type.load(Ordering::Relaxed)
    }

    pub fn set_device_type(&self, device_type: u32) {
        self.device_type.store(device_type, Ordering::Relaxed);
    }

    pub fn digital(&self, word: DigitalWord) -> u16 {
        match word {
            DigitalWord::First => self.digital_1.load(Ordering::Relaxed),
            DigitalWord::Second => self.digital_2.load(Ordering::Relaxed),
        }
    }

    pub fn set_button(&self, word: DigitalWord, mask: u16, pressed: bool) {
        let target = match word {
            DigitalWord::First => &self.digital_1,
            DigitalWord::Second => &self.digital_2,
        };
        if pressed {
            target.fetch_or(mask, Ordering::Relaxed);
        } else {
            target.fetch_and(!mask, Ordering::Relaxed);
        }
    }

    pub fn stick(&self, axis: StickAxis) -> u8 {
        self.sticks[axis as usize].load(Ordering::Relaxed)
    }

    pub fn set_stick(&self, axis: StickAxis, value: u8) {
        self.sticks[axis as usize].store(value, Ordering::Relaxed);
    }

    /// Drop all held input back to neutral
    pub fn clear_input(&self) {
        self.digital_1.store(0, Ordering::Relaxed);
        self.digital_2.store(0, Ordering::Relaxed);
        for stick in &self.sticks {
            stick.store(STICK_CENTER, Ordering::Relaxed);
        }
    }

    /// Install the rumble channels of the bound device.
    ///
    /// Only the first call has an effect; returns false otherwise.
    pub fn install_motors(&self, motors: Vec<VibrateMotor>) -> bool {
        self.vibrate_motors.set(motors).is_ok()
    }

    pub fn vibrate_motors(&self) -> &[VibrateMotor] {
        self.vibrate_motors.get().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Snapshot of the aggregate info block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PadInfo {
    pub now_connect: u32,
    pub system_info: u32,
}

impl PadInfo {
    pub fn is_intercepted(&self) -> bool {
        self.system_info & INFO_INTERCEPTED != 0
    }
}

/// Aggregate info block shared with the console's status query path
#[derive(Debug, Default)]
pub struct PadInfoBlock {
    now_connect: AtomicU32,
    system_info: AtomicU32,
}

impl PadInfoBlock {
    pub fn snapshot(&self) -> PadInfo {
        PadInfo {
            now_connect: self.now_connect.load(Ordering::Relaxed),
            system_info: self.system_info.load(Ordering::Relaxed),
        }
    }

    pub fn set_now_connect(&self, connected: u32) {
        self.now_connect.store(connected, Ordering::Relaxed);
    }

    pub fn set_system_flag(&self, flag: u32, enabled: bool) {
        if enabled {
            self.system_info.fetch_or(flag, Ordering::Relaxed);
        } else {
            self.system_info.fetch_and(!flag, Ordering::Relaxed);
        }
    }

    /// Drop per-tick state, keeping the session flags
    pub fn reset_connections(&self) {
        self.now_connect.store(0, Ordering::Relaxed);
    }
}
