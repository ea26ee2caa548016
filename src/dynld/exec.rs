//! Execution environment and the executor seam.

use core::time::Duration;

use burster::Limiter;
use log::debug;
#[cfg(feature = "native-exec")]
use log::warn;

use super::RC_FAILED;

/// Scratch buffer handed to slot code.
pub const ENV_BUF_SIZE: usize = 32;

/// Longest text accepted by one print call.
pub const PRINT_LIMIT: usize = 64;

/// Text kept between [`ExecEnv::take_output`] calls.
const OUTPUT_CAPACITY: usize = 128;

/// Print calls allowed per second, and burst size.
const PRINT_RATE: u64 = 8;

/// What slot code sees while running.
pub struct ExecEnv {
    /// Arguments on entry, results on return.
    pub buf: [u8; ENV_BUF_SIZE],
    args_len: usize,
    output: heapless::Vec<u8, OUTPUT_CAPACITY>,
    limiter: burster::TokenBucket<fn() -> Duration>,
    suppressed: u32,
}

impl ExecEnv {
    pub fn new() -> Self {
        Self {
            buf: [0; ENV_BUF_SIZE],
            args_len: 0,
            output: heapless::Vec::new(),
            limiter: burster::TokenBucket::new_with_time_provider(
                PRINT_RATE,
                PRINT_RATE,
                platform_now as fn() -> Duration,
            ),
            suppressed: 0,
        }
    }

    /// Load call arguments into the scratch buffer, zeroing the rest.
    /// Arguments longer than the buffer are cut.
    pub fn set_args(&mut self, args: &[u8]) {
        let n = args.len().min(ENV_BUF_SIZE);
        self.buf = [0; ENV_BUF_SIZE];
        self.buf[..n].copy_from_slice(&args[..n]);
        self.args_len = n;
    }

    pub fn args(&self) -> &[u8] {
        &self.buf[..self.args_len]
    }

    pub fn args_len(&self) -> usize {
        self.args_len
    }

    /// Text output callback for slot code.
    ///
    /// Returns the number of bytes accepted, or -1 when rate limited.
    pub fn print(&mut self, text: &[u8]) -> i32 {
        if self.limiter.try_consume(1).is_err() {
            self.suppressed = self.suppressed.wrapping_add(1);
            return RC_FAILED;
        }
        let text = &text[..text.len().min(PRINT_LIMIT)];
        let room = self.output.capacity() - self.output.len();
        let n = text.len().min(room);
        // Cannot fail, `n` fits.
        let _ = self.output.extend_from_slice(&text[..n]);
        n as i32
    }

    /// Collected print output since the last call.
    pub fn take_output(&mut self) -> heapless::Vec<u8, OUTPUT_CAPACITY> {
        core::mem::take(&mut self.output)
    }

    /// Print calls refused by the rate limiter.
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }
}

impl Default for ExecEnv {
    fn default() -> Self {
        Self::new()
    }
}

fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

/// A call into a committed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCall {
    /// `fn(buf, len) -> i32` over the scratch buffer.
    Exec { entry: usize },
    /// `fn(env) -> i32` over the full environment.
    Test { entry: usize },
}

/// Transfers control to slot code.
///
/// Implementations decide whether and how code actually runs. The
/// loader only hands over a callable address.
pub trait SlotExecutor {
    fn invoke(&mut self, call: SlotCall, env: &mut ExecEnv) -> i32;
}

/// Refuses every call. Used where running host-supplied code is not
/// allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledExecutor;

impl SlotExecutor for DisabledExecutor {
    fn invoke(&mut self, call: SlotCall, _env: &mut ExecEnv) -> i32 {
        debug!("dynld: exec refused, {call:?}");
        RC_FAILED
    }
}

// ── Native execution ──────────────────────────────────────────

/// Environment layout seen by TEST slot code.
#[cfg(feature = "native-exec")]
#[repr(C)]
struct RawTestEnv {
    print: unsafe extern "C" fn(ctx: *mut core::ffi::c_void, text: *const u8, len: usize) -> i32,
    ctx: *mut core::ffi::c_void,
    buf: *mut u8,
    buf_len: usize,
}

#[cfg(feature = "native-exec")]
unsafe extern "C" fn print_trampoline(
    ctx: *mut core::ffi::c_void,
    text: *const u8,
    len: usize,
) -> i32 {
    if ctx.is_null() || text.is_null() {
        return RC_FAILED;
    }
    // SAFETY: `ctx` is the `ExecEnv` pointer placed in `RawTestEnv` by
    // `NativeExecutor::invoke`, live for the duration of the call.
    let env = unsafe { &mut *ctx.cast::<ExecEnv>() };
    // SAFETY: slot code promises `len` readable bytes at `text`.
    let text = unsafe { core::slice::from_raw_parts(text, len) };
    env.print(text)
}

/// Jumps straight into slot memory.
///
/// Only sound on targets where the slot buffers are executable and the
/// loaded code matches the core's calling convention.
#[cfg(feature = "native-exec")]
#[derive(Debug, Default)]
pub struct NativeExecutor;

#[cfg(feature = "native-exec")]
impl SlotExecutor for NativeExecutor {
    fn invoke(&mut self, call: SlotCall, env: &mut ExecEnv) -> i32 {
        warn!("dynld: native call {call:?}");
        match call {
            SlotCall::Exec { entry } => {
                // SAFETY: `entry` comes from an armed slot; the host
                // loaded a function with this signature.
                let f: unsafe extern "C" fn(*mut u8, usize) -> i32 =
                    unsafe { core::mem::transmute(entry) };
                let len = env.args_len();
                unsafe { f(env.buf.as_mut_ptr(), len) }
            }
            SlotCall::Test { entry } => {
                let env_ptr: *mut ExecEnv = env;
                let mut raw = RawTestEnv {
                    print: print_trampoline,
                    ctx: env_ptr.cast(),
                    // SAFETY: `env_ptr` is derived from a live `&mut`.
                    buf: unsafe { (*env_ptr).buf.as_mut_ptr() },
                    buf_len: ENV_BUF_SIZE,
                };
                // SAFETY: as above, for the environment signature.
                let f: unsafe extern "C" fn(*mut RawTestEnv) -> i32 =
                    unsafe { core::mem::transmute(entry) };
                unsafe { f(&mut raw) }
            }
        }
    }
}
