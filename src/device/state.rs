//! Status and config tables exposed over the link.
//!
//! Every struct the host can read or write has an explicit byte layout
//! here plus a matching [`StructDescriptor`] registered with the layout
//! emitter, so the bytes on the wire and the self-description never
//! disagree.
//!
//! ```text
//!  status (group 4)           config (group 9)
//!  1 battery   RO 4 bytes     1 debug          1 byte   bits
//!  2 dip       RO 1 byte      2 debug_user     4 bytes  bits
//!  3 matrix    RO rows*w      3 rgb_matrix     8 bytes
//!                             4 keymap         2 bytes  bits
//!                             5 keymap_layout  RO 2*rows*cols
//!                             6 debounce       1 byte
//!                             7 devel          4 bytes  bits
//! ```

use crate::app::ports::KeyboardPort;
use crate::config::{MAX_RESPONSE_SIZE, MatrixGeometry};
use crate::error::{LayoutError, StateError};
use crate::layout::{FLAG_READ_ONLY, FieldDescriptor, FieldType, LayoutEmitter, StructDescriptor};
use crate::proto::message::target;

/// Largest struct body that still fits a response after its header.
pub const MAX_STRUCT_SIZE: usize = MAX_RESPONSE_SIZE - 3;

/// Raw struct bytes as sent on the wire.
pub type StructBytes = heapless::Vec<u8, MAX_STRUCT_SIZE>;

// ── Ids ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusId {
    Battery = 1,
    DipSwitch = 2,
    Matrix = 3,
}

impl TryFrom<u8> for StatusId {
    type Error = StateError;

    fn try_from(v: u8) -> Result<Self, StateError> {
        match v {
            1 => Ok(Self::Battery),
            2 => Ok(Self::DipSwitch),
            3 => Ok(Self::Matrix),
            other => Err(StateError::UnknownId(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigId {
    Debug = 1,
    DebugUser = 2,
    RgbMatrix = 3,
    Keymap = 4,
    /// Layer 0 keycodes, read-only.
    KeymapLayout = 5,
    Debounce = 6,
    Devel = 7,
}

impl TryFrom<u8> for ConfigId {
    type Error = StateError;

    fn try_from(v: u8) -> Result<Self, StateError> {
        match v {
            1 => Ok(Self::Debug),
            2 => Ok(Self::DebugUser),
            3 => Ok(Self::RgbMatrix),
            4 => Ok(Self::Keymap),
            5 => Ok(Self::KeymapLayout),
            6 => Ok(Self::Debounce),
            7 => Ok(Self::Devel),
            other => Err(StateError::UnknownId(other)),
        }
    }
}

// ── Config structs ───────────────────────────────────────────

/// Core debug flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugConfig(pub u8);

impl DebugConfig {
    pub const ENABLE: u8 = 1 << 0;
    pub const MATRIX: u8 = 1 << 1;
    pub const KEYBOARD: u8 = 1 << 2;
    pub const MOUSE: u8 = 1 << 3;

    pub const fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    pub const fn enable(self) -> bool {
        self.0 & Self::ENABLE != 0
    }
}

/// Firmware-specific debug switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugUserConfig(pub u32);

impl DebugUserConfig {
    /// Trace protocol handling on the console.
    pub const PROTOCOL: u32 = 1 << 0;
    pub const STATS: u32 = 1 << 1;
    pub const USER_ANIM: u32 = 1 << 2;

    pub const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    pub const fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub const fn protocol(self) -> bool {
        self.has(Self::PROTOCOL)
    }
}

/// Development hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevelConfig(pub u32);

impl DevelConfig {
    /// Publish key events to the host.
    pub const PUB_KEYPRESS: u32 = 1 << 0;
    /// Keep processing published key events locally.
    pub const PROCESS_KEYPRESS: u32 = 1 << 1;

    pub const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    pub const fn pub_keypress(self) -> bool {
        self.0 & Self::PUB_KEYPRESS != 0
    }

    pub const fn process_keypress(self) -> bool {
        self.0 & Self::PROCESS_KEYPRESS != 0
    }
}

/// Lighting config. Byte 0 packs `enable` (2 bits) under `mode` (6 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbConfig {
    pub enable: u8,
    pub mode: u8,
    pub hue: u8,
    pub sat: u8,
    pub val: u8,
    pub speed: u8,
    pub flags: u8,
}

impl RgbConfig {
    pub const SIZE: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        [
            (self.enable & 0x03) | (self.mode << 2),
            self.hue,
            self.sat,
            self.val,
            self.speed,
            self.flags,
            0,
            0,
        ]
    }

    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self {
            enable: raw[0] & 0x03,
            mode: raw[0] >> 2,
            hue: raw[1],
            sat: raw[2],
            val: raw[3],
            speed: raw[4],
            flags: raw[5],
        }
    }
}

impl Default for RgbConfig {
    fn default() -> Self {
        Self {
            enable: 1,
            mode: 1,
            hue: 0,
            sat: 255,
            val: 255,
            speed: 127,
            flags: 0xFF,
        }
    }
}

/// Keymap behaviour switches, 13 one-bit fields in a u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeymapConfig(pub u16);

/// Field count of [`KeymapConfig`].
pub const KEYMAP_FLAG_COUNT: u8 = 13;

/// All host-visible config owned by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub debug: DebugConfig,
    pub debug_user: DebugUserConfig,
    pub rgb: RgbConfig,
    pub keymap: KeymapConfig,
    pub debounce: u8,
    pub devel: DevelConfig,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            debug: DebugConfig::default().with(DebugConfig::ENABLE),
            debug_user: DebugUserConfig::default(),
            rgb: RgbConfig::default(),
            keymap: KeymapConfig::default(),
            debounce: 5,
            devel: DevelConfig::default(),
        }
    }
}

impl DeviceState {
    /// Size of config struct `id` in bytes.
    pub fn config_size(id: ConfigId, geometry: &MatrixGeometry) -> usize {
        match id {
            ConfigId::Debug | ConfigId::Debounce => 1,
            ConfigId::Keymap => 2,
            ConfigId::DebugUser | ConfigId::Devel => 4,
            ConfigId::RgbMatrix => RgbConfig::SIZE,
            ConfigId::KeymapLayout => 2 * geometry.key_count(),
        }
    }

    /// Raw bytes of config struct `id`.
    pub fn config_bytes(
        &self,
        id: ConfigId,
        kb: &impl KeyboardPort,
        geometry: &MatrixGeometry,
    ) -> StructBytes {
        let mut out = StructBytes::new();
        match id {
            ConfigId::Debug => put(&mut out, &[self.debug.0]),
            ConfigId::DebugUser => put(&mut out, &self.debug_user.0.to_le_bytes()),
            ConfigId::RgbMatrix => put(&mut out, &self.rgb.to_bytes()),
            ConfigId::Keymap => put(&mut out, &self.keymap.0.to_le_bytes()),
            ConfigId::KeymapLayout => {
                for row in 0..geometry.rows {
                    for col in 0..geometry.cols {
                        put(&mut out, &kb.keycode(row, col).to_le_bytes());
                    }
                }
            }
            ConfigId::Debounce => put(&mut out, &[self.debounce]),
            ConfigId::Devel => put(&mut out, &self.devel.0.to_le_bytes()),
        }
        out
    }

    /// Overwrite config struct `id` from the head of `payload`. Bytes
    /// past the struct size are ignored.
    pub fn write_config(
        &mut self,
        id: ConfigId,
        payload: &[u8],
        geometry: &MatrixGeometry,
    ) -> Result<(), StateError> {
        if id == ConfigId::KeymapLayout {
            return Err(StateError::ReadOnly(id as u8));
        }
        let need = Self::config_size(id, geometry);
        let raw = payload.get(..need).ok_or(StateError::ShortPayload {
            id: id as u8,
            need,
            got: payload.len(),
        })?;
        match id {
            ConfigId::Debug => self.debug = DebugConfig(raw[0]),
            ConfigId::DebugUser => self.debug_user = DebugUserConfig(le_u32(raw)),
            ConfigId::RgbMatrix => {
                let mut b = [0u8; RgbConfig::SIZE];
                b.copy_from_slice(raw);
                self.rgb = RgbConfig::from_bytes(&b);
            }
            ConfigId::Keymap => self.keymap = KeymapConfig(u16::from_le_bytes([raw[0], raw[1]])),
            ConfigId::Debounce => self.debounce = raw[0],
            ConfigId::Devel => self.devel = DevelConfig(le_u32(raw)),
            ConfigId::KeymapLayout => {}
        }
        Ok(())
    }

    /// Raw bytes of status struct `id`, sampled from the board.
    pub fn status_bytes(
        id: StatusId,
        kb: &impl KeyboardPort,
        geometry: &MatrixGeometry,
    ) -> StructBytes {
        let mut out = StructBytes::new();
        match id {
            StatusId::Battery => {
                // Only reachable over USB, so always charging or full.
                put(&mut out, &[kb.battery_level()]);
                put(&mut out, &kb.battery_voltage().to_le_bytes());
                put(&mut out, &[1]);
            }
            StatusId::DipSwitch => put(&mut out, &[kb.dip_switches()]),
            StatusId::Matrix => {
                let w = geometry.row_bytes();
                for row in 0..geometry.rows {
                    put(&mut out, &kb.matrix_row(row).to_le_bytes()[..w]);
                }
            }
        }
        out
    }
}

fn put(out: &mut StructBytes, bytes: &[u8]) {
    // Table sizes are bounded by the layout registration check.
    let _ = out.extend_from_slice(bytes);
}

fn le_u32(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

/// Canary for bit-order detection: the debug config with only `enable`
/// set.
pub fn debug_canary() -> u64 {
    u64::from(DebugConfig::default().with(DebugConfig::ENABLE).0)
}

// ── Layouts ──────────────────────────────────────────────────

/// Register every status and config struct with `emitter`.
pub fn register_layouts(
    emitter: &mut LayoutEmitter,
    geometry: &MatrixGeometry,
) -> Result<(), LayoutError> {
    let status = target::STATUS;
    let config = target::CONFIG;
    let key_count = geometry.key_count();
    let row_bytes = geometry.row_bytes();

    if DeviceState::config_size(ConfigId::KeymapLayout, geometry) > MAX_STRUCT_SIZE {
        return Err(LayoutError::FrameTooLarge {
            group: config,
            id: ConfigId::KeymapLayout as u8,
        });
    }

    let structs = [
        StructDescriptor::new(
            status,
            StatusId::Battery as u8,
            4,
            FLAG_READ_ONLY,
            &[
                FieldDescriptor::byte(1, 0),
                FieldDescriptor::scalar(2, FieldType::U16, 1),
                FieldDescriptor::byte(3, 3),
            ],
        )?,
        StructDescriptor::new(
            status,
            StatusId::DipSwitch as u8,
            1,
            FLAG_READ_ONLY,
            &[FieldDescriptor::byte(1, 0)],
        )?,
        StructDescriptor::new(
            status,
            StatusId::Matrix as u8,
            geometry.rows as usize * row_bytes,
            FLAG_READ_ONLY,
            &[FieldDescriptor::array(
                1,
                FieldType::for_width(row_bytes),
                0,
                geometry.rows,
            )],
        )?,
        StructDescriptor::new(
            config,
            ConfigId::Debug as u8,
            1,
            0,
            &[
                FieldDescriptor::bits(1, 0, 1, 8),
                FieldDescriptor::bits(2, 1, 1, 8),
                FieldDescriptor::bits(3, 2, 1, 8),
                FieldDescriptor::bits(4, 3, 1, 8),
            ],
        )?,
        StructDescriptor::new(
            config,
            ConfigId::DebugUser as u8,
            4,
            0,
            &[
                FieldDescriptor::bits(1, 0, 1, 8),
                FieldDescriptor::bits(2, 1, 1, 8),
                FieldDescriptor::bits(3, 2, 1, 8),
            ],
        )?,
        StructDescriptor::new(
            config,
            ConfigId::RgbMatrix as u8,
            RgbConfig::SIZE,
            0,
            &[
                FieldDescriptor::bits(1, 0, 2, 8),
                FieldDescriptor::bits(2, 2, 6, 8),
                FieldDescriptor::byte(3, 1),
                FieldDescriptor::byte(4, 2),
                FieldDescriptor::byte(5, 3),
                FieldDescriptor::byte(6, 4),
                FieldDescriptor::byte(7, 5),
            ],
        )?,
        keymap_descriptor()?,
        StructDescriptor::new(
            config,
            ConfigId::KeymapLayout as u8,
            2 * key_count,
            FLAG_READ_ONLY,
            &[FieldDescriptor::array(
                1,
                FieldType::U16,
                0,
                u8::try_from(key_count).map_err(|_| LayoutError::FrameTooLarge {
                    group: config,
                    id: ConfigId::KeymapLayout as u8,
                })?,
            )],
        )?,
        StructDescriptor::new(
            config,
            ConfigId::Debounce as u8,
            1,
            0,
            &[FieldDescriptor::byte(1, 0)],
        )?,
        StructDescriptor::new(
            config,
            ConfigId::Devel as u8,
            4,
            0,
            &[
                FieldDescriptor::bits(1, 0, 1, 8),
                FieldDescriptor::bits(2, 1, 1, 8),
            ],
        )?,
    ];

    for desc in structs {
        emitter.register(desc)?;
    }
    Ok(())
}

fn keymap_descriptor() -> Result<StructDescriptor, LayoutError> {
    let mut fields: heapless::Vec<FieldDescriptor, { KEYMAP_FLAG_COUNT as usize }> =
        heapless::Vec::new();
    for i in 0..KEYMAP_FLAG_COUNT {
        let _ = fields.push(FieldDescriptor::bits(i + 1, i, 1, 16));
    }
    StructDescriptor::new(target::CONFIG, ConfigId::Keymap as u8, 2, 0, &fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{BitOrder, FieldKind};

    struct Kb;

    impl KeyboardPort for Kb {
        fn set_default_layer(&mut self, _mask: u32) {}
        fn default_layer(&self) -> u32 {
            1
        }
        fn set_macwin_mode(&mut self, _mode: i8) {}
        fn macwin_mode(&self) -> i8 {
            -1
        }
        fn battery_level(&self) -> u8 {
            80
        }
        fn battery_voltage(&self) -> u16 {
            0x1004
        }
        fn dip_switches(&self) -> u8 {
            1
        }
        fn matrix_row(&self, row: u8) -> u32 {
            0x0001_0000 | u32::from(row)
        }
        fn keycode(&self, row: u8, col: u8) -> u16 {
            u16::from(row) << 8 | u16::from(col)
        }
        fn set_led_color(&mut self, _index: u8, _r: u8, _g: u8, _b: u8) {}
        fn debug_led_on(&mut self, _led: u8) {}
    }

    fn emitter() -> LayoutEmitter {
        let mut e = LayoutEmitter::new(debug_canary);
        register_layouts(&mut e, &MatrixGeometry::default()).unwrap();
        e
    }

    #[test]
    fn canary_is_lsb_first() {
        assert_eq!(debug_canary(), 1);
        assert_eq!(emitter().bit_order(), BitOrder::LsbFirst);
    }

    #[test]
    fn every_struct_registered() {
        let e = emitter();
        assert_eq!(e.len(), 10);
        let layout = e.lookup(target::CONFIG, ConfigId::KeymapLayout as u8).unwrap();
        assert!(layout.is_read_only());
        assert_eq!(layout.size, 204);
        assert!(!e.lookup(target::CONFIG, ConfigId::Debug as u8).unwrap().is_read_only());
    }

    #[test]
    fn descriptor_sizes_match_bytes() {
        let e = emitter();
        let g = MatrixGeometry::default();
        let state = DeviceState::default();
        for id in 1..=7u8 {
            let cid = ConfigId::try_from(id).unwrap();
            let raw = state.config_bytes(cid, &Kb, &g);
            assert_eq!(raw.len(), e.lookup(target::CONFIG, id).unwrap().size as usize);
        }
        for id in 1..=3u8 {
            let sid = StatusId::try_from(id).unwrap();
            let raw = DeviceState::status_bytes(sid, &Kb, &g);
            assert_eq!(raw.len(), e.lookup(target::STATUS, id).unwrap().size as usize);
        }
    }

    #[test]
    fn matrix_rows_use_row_width() {
        let e = emitter();
        let desc = e.lookup(target::STATUS, StatusId::Matrix as u8).unwrap();
        assert_eq!(
            desc.fields[0].kind,
            FieldKind::Array {
                elem: FieldType::U32,
                offset: 0,
                count: 6
            }
        );
        let raw = DeviceState::status_bytes(StatusId::Matrix, &Kb, &MatrixGeometry::default());
        assert_eq!(&raw[4..8], &[1, 0, 1, 0]);
    }

    #[test]
    fn battery_layout() {
        let raw = DeviceState::status_bytes(StatusId::Battery, &Kb, &MatrixGeometry::default());
        assert_eq!(raw.as_slice(), &[80, 0x04, 0x10, 1]);
        let desc = emitter();
        let desc = desc.lookup(target::STATUS, 1).unwrap();
        assert_eq!(desc.field(2).unwrap().read(&raw), Some(0x1004));
    }

    #[test]
    fn debug_enable_field_reads_canary() {
        let e = emitter();
        let desc = e.lookup(target::CONFIG, ConfigId::Debug as u8).unwrap();
        assert_eq!(desc.field(1).unwrap().read(&[debug_canary() as u8]), Some(1));
        assert_eq!(desc.field(2).unwrap().read(&[debug_canary() as u8]), Some(0));
    }

    #[test]
    fn rgb_bytes_and_fields_agree() {
        let e = emitter();
        let desc = e.lookup(target::CONFIG, ConfigId::RgbMatrix as u8).unwrap();
        let rgb = RgbConfig {
            enable: 2,
            mode: 37,
            hue: 10,
            sat: 20,
            val: 30,
            speed: 40,
            flags: 50,
        };
        let raw = rgb.to_bytes();
        assert_eq!(desc.field(1).unwrap().read(&raw), Some(2));
        assert_eq!(desc.field(2).unwrap().read(&raw), Some(37));
        assert_eq!(desc.field(5).unwrap().read(&raw), Some(30));
        assert_eq!(desc.field(7).unwrap().read(&raw), Some(50));
        assert_eq!(RgbConfig::from_bytes(&raw), rgb);
    }

    #[test]
    fn write_config_checks() {
        let g = MatrixGeometry::default();
        let mut s = DeviceState::default();
        assert_eq!(
            s.write_config(ConfigId::KeymapLayout, &[0; 204], &g),
            Err(StateError::ReadOnly(5))
        );
        assert_eq!(
            s.write_config(ConfigId::Devel, &[1, 0], &g),
            Err(StateError::ShortPayload { id: 7, need: 4, got: 2 })
        );
        s.write_config(ConfigId::Devel, &[3, 0, 0, 0, 0xAA], &g).unwrap();
        assert!(s.devel.pub_keypress() && s.devel.process_keypress());
        s.write_config(ConfigId::Debounce, &[9], &g).unwrap();
        assert_eq!(s.config_bytes(ConfigId::Debounce, &Kb, &g).as_slice(), &[9]);
    }

    #[test]
    fn keymap_layout_little_endian() {
        let raw = DeviceState::default().config_bytes(
            ConfigId::KeymapLayout,
            &Kb,
            &MatrixGeometry::default(),
        );
        assert_eq!(&raw[..4], &[0, 0, 1, 0]);
        assert_eq!(&raw[34..36], &[0, 1]);
    }

    #[test]
    fn oversized_geometry_rejected() {
        let mut e = LayoutEmitter::new(debug_canary);
        let g = MatrixGeometry {
            rows: 8,
            cols: 32,
            led_count: 0,
        };
        assert!(matches!(
            register_layouts(&mut e, &g),
            Err(LayoutError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn unknown_ids() {
        assert_eq!(ConfigId::try_from(0), Err(StateError::UnknownId(0)));
        assert_eq!(StatusId::try_from(4), Err(StateError::UnknownId(4)));
    }
}
