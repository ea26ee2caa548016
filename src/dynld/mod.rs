//! Dynamic code slots.
//!
//! The host streams small position-independent code fragments into one
//! of a few fixed, 4-byte aligned slots, commits them, then asks for
//! them to be run:
//!
//! ```text
//! load  [slot u16][offset u16][bytes]   offset 0      clears the slot first
//!                                       offset 0xFFFF commits (arms) the slot
//! exec  [slot u16][args...]             -> i32 return code
//! ```
//!
//! Storage and bookkeeping live here and are always available. Actually
//! jumping into a slot goes through [`SlotExecutor`]; the default
//! executor refuses, and the native one only exists with the
//! `native-exec` feature.

mod exec;

pub use exec::{DisabledExecutor, ENV_BUF_SIZE, ExecEnv, PRINT_LIMIT, SlotCall, SlotExecutor};
#[cfg(feature = "native-exec")]
pub use exec::NativeExecutor;

use log::{debug, info};

use crate::error::LoadError;

/// Bytes per slot.
pub const SLOT_CAPACITY: usize = 1024;

/// Load offset that commits a slot instead of writing to it.
pub const COMMIT_OFFSET: u16 = 0xFFFF;

/// Return code for every failed load or exec.
pub const RC_FAILED: i32 = -1;

/// Slot table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SlotId {
    /// Animation hook; run by the renderer, never by an exec request.
    Animation = 0,
    /// Called with the scratch buffer and argument length.
    Exec = 1,
    /// Called with the whole execution environment.
    Test = 2,
}

/// Number of slots.
pub const SLOT_COUNT: usize = 3;

impl TryFrom<u16> for SlotId {
    type Error = LoadError;

    fn try_from(v: u16) -> Result<Self, LoadError> {
        match v {
            0 => Ok(Self::Animation),
            1 => Ok(Self::Exec),
            2 => Ok(Self::Test),
            other => Err(LoadError::SlotOutOfRange(other)),
        }
    }
}

/// Slot storage, aligned for instruction fetch.
#[repr(C, align(4))]
pub struct SlotBuffer(pub [u8; SLOT_CAPACITY]);

/// One code slot.
pub struct CodeSlot {
    buf: SlotBuffer,
    high_water: usize,
    armed: bool,
}

impl CodeSlot {
    const fn new() -> Self {
        Self {
            buf: SlotBuffer([0; SLOT_CAPACITY]),
            high_water: 0,
            armed: false,
        }
    }

    fn clear(&mut self) {
        self.buf.0.fill(0);
        self.high_water = 0;
        self.armed = false;
    }

    /// Callable address of the slot, if committed.
    ///
    /// Computed on demand from the buffer's current location, with the
    /// Thumb interworking bit set on ARM targets.
    pub fn entry(&self) -> Option<usize> {
        self.armed.then(|| thumb_adjust(self.buf.0.as_ptr() as usize))
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Bytes written so far (highest written offset).
    pub fn len(&self) -> usize {
        self.high_water
    }

    pub fn is_empty(&self) -> bool {
        self.high_water == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf.0
    }
}

/// Set bit 0 of a code address where the core runs Thumb code.
pub const fn thumb_adjust(addr: usize) -> usize {
    if cfg!(target_arch = "arm") { addr | 1 } else { addr }
}

/// Result of a successful load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Bytes copied; the slot stays disarmed until committed.
    Stored,
    /// Offset 0 with a zero prefix: slot cleared and left empty.
    Unloaded,
    /// Commit armed the slot.
    Committed,
    /// Commit on a slot whose first two bytes are zero; nothing armed.
    CommitSkipped,
}

/// The slot table.
pub struct CodeLoader {
    slots: [CodeSlot; SLOT_COUNT],
}

impl CodeLoader {
    pub const fn new() -> Self {
        Self {
            slots: [CodeSlot::new(), CodeSlot::new(), CodeSlot::new()],
        }
    }

    /// Apply one load request.
    ///
    /// An out-of-range `slot` is rejected before anything else. A write
    /// past the slot end zeroes the slot and clears its entry point.
    pub fn load(&mut self, slot: u16, offset: u16, bytes: &[u8]) -> Result<LoadStatus, LoadError> {
        let s = self
            .slots
            .get_mut(slot as usize)
            .ok_or(LoadError::SlotOutOfRange(slot))?;

        if offset == COMMIT_OFFSET {
            if s.buf.0[..2] == [0, 0] {
                debug!("dynld: commit slot {slot} skipped, slot empty");
                return Ok(LoadStatus::CommitSkipped);
            }
            s.armed = true;
            info!("dynld: slot {slot} armed, {} bytes", s.high_water);
            return Ok(LoadStatus::Committed);
        }

        let start = offset as usize;
        let end = start + bytes.len();
        if end > SLOT_CAPACITY {
            s.clear();
            return Err(LoadError::Overflow {
                offset,
                len: bytes.len(),
            });
        }

        if start == 0 {
            s.clear();
            if bytes.len() >= 2 && bytes[..2] == [0, 0] {
                debug!("dynld: slot {slot} unloaded");
                return Ok(LoadStatus::Unloaded);
            }
        }

        s.armed = false;
        s.buf.0[start..end].copy_from_slice(bytes);
        s.high_water = s.high_water.max(end);
        Ok(LoadStatus::Stored)
    }

    /// Run `slot` through `executor`. Every failure is [`RC_FAILED`].
    pub fn exec(
        &self,
        slot: u16,
        executor: &mut dyn SlotExecutor,
        env: &mut ExecEnv,
    ) -> i32 {
        let Ok(id) = SlotId::try_from(slot) else {
            return RC_FAILED;
        };
        let Some(entry) = self.slots[id as usize].entry() else {
            debug!("dynld: slot {slot} not armed");
            return RC_FAILED;
        };
        match id {
            SlotId::Animation => RC_FAILED,
            SlotId::Exec => executor.invoke(SlotCall::Exec { entry }, env),
            SlotId::Test => executor.invoke(SlotCall::Test { entry }, env),
        }
    }

    /// Entry point of the animation slot, for the renderer.
    pub fn animation_entry(&self) -> Option<usize> {
        self.slots[SlotId::Animation as usize].entry()
    }

    pub fn slot(&self, id: SlotId) -> &CodeSlot {
        &self.slots[id as usize]
    }
}

impl Default for CodeLoader {
    fn default() -> Self {
        Self::new()
    }
}
