//! Struct introspection: self-describing binary layouts.
//!
//! Each component that exposes raw struct bytes over the link (config
//! tables, status tables) registers a [`StructDescriptor`] with the
//! [`LayoutEmitter`]. A `GET STRUCT_LAYOUT [group]` request then streams
//! one response frame per registered struct of that group:
//!
//! ```text
//! [seq?][8][group][struct id][size][flags]  [id][type][pos][width] * N
//! ```
//!
//! Bit-field positions depend on how the firmware's compiler packs bit
//! fields. The order is detected once from a canary value and cached.

use core::cell::OnceCell;

use log::debug;
use serde::Serialize;

use crate::error::LayoutError;
use crate::proto::message::{Responder, target};

/// Most fields a single struct can carry.
pub const MAX_FIELDS: usize = 16;

/// Most structs the emitter can hold.
pub const MAX_STRUCTS: usize = 16;

/// Layout frames never exceed this many bytes, sequence number included.
pub const LAYOUT_FRAME_CAPACITY: usize = 60;

/// Struct flag: host must not write this struct.
pub const FLAG_READ_ONLY: u8 = 0x01;

/// Type tag bit marking an array of the low-bits element type.
pub const TYPE_ARRAY: u8 = 0x80;

/// Bytes before the first field record: seq, target, group, id, size, flags.
const HEADER_LEN: usize = 6;
const FIELD_LEN: usize = 4;

/// Scalar type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum FieldType {
    Bit = 1,
    U8 = 2,
    U16 = 3,
    U32 = 4,
    U64 = 5,
    Float = 6,
}

impl FieldType {
    /// Width in bytes of one element (bits count as one byte).
    pub const fn width(self) -> u8 {
        match self {
            Self::Bit | Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 | Self::Float => 4,
            Self::U64 => 8,
        }
    }

    /// Unsigned type matching a matrix row of `bytes` bytes.
    pub const fn for_width(bytes: usize) -> Self {
        match bytes {
            0 | 1 => Self::U8,
            2 => Self::U16,
            3 | 4 => Self::U32,
            _ => Self::U64,
        }
    }
}

/// Where a field lives inside the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    /// `width` bits starting at `index` inside a `storage_bits` wide unit.
    Bits { index: u8, width: u8, storage_bits: u8 },
    /// A scalar at a byte offset.
    Scalar { ty: FieldType, offset: u8 },
    /// `count` elements starting at a byte offset.
    Array { elem: FieldType, offset: u8, count: u8 },
}

/// One field of a struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub id: u8,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub const fn bits(id: u8, index: u8, width: u8, storage_bits: u8) -> Self {
        Self {
            id,
            kind: FieldKind::Bits {
                index,
                width,
                storage_bits,
            },
        }
    }

    pub const fn scalar(id: u8, ty: FieldType, offset: u8) -> Self {
        Self {
            id,
            kind: FieldKind::Scalar { ty, offset },
        }
    }

    pub const fn byte(id: u8, offset: u8) -> Self {
        Self::scalar(id, FieldType::U8, offset)
    }

    pub const fn array(id: u8, elem: FieldType, offset: u8, count: u8) -> Self {
        Self {
            id,
            kind: FieldKind::Array {
                elem,
                offset,
                count,
            },
        }
    }

    /// Wire type tag.
    pub const fn type_tag(&self) -> u8 {
        match self.kind {
            FieldKind::Bits { .. } => FieldType::Bit as u8,
            FieldKind::Scalar { ty, .. } => ty as u8,
            FieldKind::Array { elem, .. } => TYPE_ARRAY | elem as u8,
        }
    }

    /// `[id][type][position][width]` record under `order`.
    pub fn record(&self, order: BitOrder) -> [u8; FIELD_LEN] {
        match self.kind {
            FieldKind::Bits {
                index,
                width,
                storage_bits,
            } => [
                self.id,
                self.type_tag(),
                order.position(index, storage_bits),
                width,
            ],
            FieldKind::Scalar { ty, offset } => [self.id, self.type_tag(), offset, ty.width()],
            FieldKind::Array { offset, count, .. } => [self.id, self.type_tag(), offset, count],
        }
    }

    /// Read this field's value out of raw struct bytes (little endian,
    /// bits numbered from the least significant end). Arrays yield their
    /// first element.
    pub fn read(&self, raw: &[u8]) -> Option<u64> {
        let load = |offset: usize, width: usize| -> Option<u64> {
            let bytes = raw.get(offset..offset + width)?;
            Some(
                bytes
                    .iter()
                    .rev()
                    .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
            )
        };
        match self.kind {
            FieldKind::Bits {
                index,
                width,
                storage_bits,
            } => {
                let unit = load(0, (storage_bits as usize).div_ceil(8))?;
                let mask = match width {
                    0 => 0,
                    w if w >= 64 => u64::MAX,
                    w => u64::MAX >> (64 - w),
                };
                Some(unit.checked_shr(u32::from(index)).unwrap_or(0) & mask)
            }
            FieldKind::Scalar { ty, offset } => load(offset as usize, ty.width() as usize),
            FieldKind::Array { elem, offset, .. } => load(offset as usize, elem.width() as usize),
        }
    }
}

/// One introspectable struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructDescriptor {
    pub group: u8,
    pub id: u8,
    pub size: u8,
    pub flags: u8,
    pub fields: heapless::Vec<FieldDescriptor, MAX_FIELDS>,
}

impl StructDescriptor {
    pub fn new(
        group: u8,
        id: u8,
        size: usize,
        flags: u8,
        fields: &[FieldDescriptor],
    ) -> Result<Self, LayoutError> {
        let too_large = LayoutError::FrameTooLarge { group, id };
        let size = u8::try_from(size).map_err(|_| too_large)?;
        let fields = heapless::Vec::from_slice(fields).map_err(|_| too_large)?;
        Ok(Self {
            group,
            id,
            size,
            flags,
            fields,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.flags & FLAG_READ_ONLY != 0
    }

    /// Encoded frame length with a sequence number.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.fields.len() * FIELD_LEN
    }

    pub fn field(&self, id: u8) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.id == id)
    }
}

// ── Bit order ────────────────────────────────────────────────

/// How the compiler numbers bits inside a bit-field storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BitOrder {
    LsbFirst,
    MsbFirst,
}

impl BitOrder {
    /// Classify the raw value of a struct whose first declared one-bit
    /// field alone is set.
    pub fn from_canary(raw: u64) -> Self {
        if raw == 1 { Self::LsbFirst } else { Self::MsbFirst }
    }

    /// Emitted position of bit `index` in a `storage_bits` wide unit.
    pub fn position(self, index: u8, storage_bits: u8) -> u8 {
        match self {
            Self::LsbFirst => index,
            Self::MsbFirst => storage_bits.saturating_sub(1).saturating_sub(index),
        }
    }
}

/// Detect-once cache for [`BitOrder`].
#[derive(Debug, Default)]
pub struct BitOrderCache {
    cell: OnceCell<BitOrder>,
}

impl BitOrderCache {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Cached order, running `probe` only on first use.
    pub fn get_or_detect(&self, probe: impl FnOnce() -> u64) -> BitOrder {
        *self.cell.get_or_init(|| {
            let order = BitOrder::from_canary(probe());
            debug!("layout: bit order {:?}", order);
            order
        })
    }

    pub fn get(&self) -> Option<BitOrder> {
        self.cell.get().copied()
    }
}

// ── Emitter ──────────────────────────────────────────────────

/// Registered schemas plus the cached bit order.
pub struct LayoutEmitter {
    table: heapless::Vec<StructDescriptor, MAX_STRUCTS>,
    order: BitOrderCache,
    probe: fn() -> u64,
}

#[derive(Serialize)]
struct SchemaExport<'a> {
    bit_order: BitOrder,
    structs: &'a [StructDescriptor],
}

impl LayoutEmitter {
    /// `probe` returns the canary's raw value; it runs at most once.
    pub fn new(probe: fn() -> u64) -> Self {
        Self {
            table: heapless::Vec::new(),
            order: BitOrderCache::new(),
            probe,
        }
    }

    /// Pin the bit order instead of probing.
    pub fn with_bit_order(self, order: BitOrder) -> Self {
        let _ = self.order.cell.set(order);
        self
    }

    pub fn register(&mut self, desc: StructDescriptor) -> Result<(), LayoutError> {
        let (group, id) = (desc.group, desc.id);
        if self.lookup(group, id).is_some() {
            return Err(LayoutError::DuplicateStruct { group, id });
        }
        if desc.frame_len() > LAYOUT_FRAME_CAPACITY {
            return Err(LayoutError::FrameTooLarge { group, id });
        }
        self.table.push(desc).map_err(|_| LayoutError::TableFull)
    }

    pub fn lookup(&self, group: u8, id: u8) -> Option<&StructDescriptor> {
        self.table.iter().find(|d| d.group == group && d.id == id)
    }

    pub fn bit_order(&self) -> BitOrder {
        self.order.get_or_detect(self.probe)
    }

    pub fn has_group(&self, group: u8) -> bool {
        self.table.iter().any(|d| d.group == group)
    }

    /// Queue one layout frame for `desc`.
    pub fn emit(&self, desc: &StructDescriptor, r: &mut Responder<'_>) -> bool {
        let order = self.bit_order();
        let mut b = r.begin(target::STRUCT_LAYOUT);
        b.push(desc.group).push(desc.id).push(desc.size).push(desc.flags);
        for f in &desc.fields {
            b.extend(&f.record(order));
        }
        r.send(b)
    }

    /// Queue a frame for every struct of `group`. Returns how many were
    /// queued; zero means the group is unknown.
    pub fn emit_group(&self, group: u8, r: &mut Responder<'_>) -> usize {
        self.table
            .iter()
            .filter(|d| d.group == group)
            .filter(|d| self.emit(d, r))
            .count()
    }

    /// Whole schema as JSON for host tooling.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SchemaExport {
            bit_order: self.bit_order(),
            structs: &self.table,
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
