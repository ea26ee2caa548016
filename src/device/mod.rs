//! Device side of the link: the handler context.
//!
//! [`Device`] owns everything request handlers touch: the board ports,
//! the host-visible config tables, the colour-override buffer, the code
//! loader and the console. The protocol engine receives it as the
//! dispatch context on every pass.
//!
//! ```text
//!   ProtocolEngine ──dispatch──▶ handlers ──▶ Device ──▶ Board ports
//!                                              │
//!                                              └──▶ ConsoleMux (QA: trace)
//! ```

pub mod cli;
pub mod handlers;
pub mod rgb;
pub mod state;

use core::fmt::{self, Write as _};

use log::info;

use crate::app::ports::Board;
use crate::config::{MatrixGeometry, ProtocolConfig};
use crate::console::ConsoleMux;
use crate::dynld::{CodeLoader, DisabledExecutor, ExecEnv, SlotExecutor};
use crate::error::Result;
use crate::layout::LayoutEmitter;

use self::rgb::RgbHostBuffer;
use self::state::{DeviceState, debug_canary, register_layouts};

/// Console prefix for protocol trace lines.
pub const TRACE_PREFIX: &str = "QA:";

/// Handler context.
pub struct Device<B> {
    pub board: B,
    pub state: DeviceState,
    pub rgb: RgbHostBuffer,
    pub loader: CodeLoader,
    pub layouts: LayoutEmitter,
    pub console: ConsoleMux,
    env: ExecEnv,
    executor: Box<dyn SlotExecutor>,
    geometry: MatrixGeometry,
    cli_enabled: bool,
}

impl<B: Board> Device<B> {
    /// Build a device for `board`. Code execution starts disabled; see
    /// [`with_executor`](Self::with_executor).
    pub fn new(board: B, geometry: MatrixGeometry, config: &ProtocolConfig) -> Result<Self> {
        geometry.validate()?;
        let mut layouts = LayoutEmitter::new(debug_canary);
        register_layouts(&mut layouts, &geometry)?;

        let mut console = ConsoleMux::new(config.flush_timeout_ms);
        if let Some(banner) = &config.banner {
            console = console.with_banner(banner);
        }

        info!(
            "link: device {}x{}, {} leds, cli {}",
            geometry.rows,
            geometry.cols,
            geometry.led_count,
            if config.cli_enabled { "on" } else { "off" }
        );

        Ok(Self {
            board,
            state: DeviceState::default(),
            rgb: RgbHostBuffer::new(geometry.led_count),
            loader: CodeLoader::new(),
            layouts,
            console,
            env: ExecEnv::new(),
            executor: Box::new(DisabledExecutor),
            geometry,
            cli_enabled: config.cli_enabled,
        })
    }

    /// Replace the slot executor.
    pub fn with_executor(mut self, executor: impl SlotExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    pub fn geometry(&self) -> &MatrixGeometry {
        &self.geometry
    }

    pub fn cli_enabled(&self) -> bool {
        self.cli_enabled
    }

    /// Write a `QA:` trace line to the console when protocol tracing is
    /// switched on in the debug-user config.
    pub fn trace(&mut self, args: fmt::Arguments<'_>) {
        if self.state.debug_user.protocol() {
            let _ = self.console.write_str(TRACE_PREFIX);
            let _ = self.console.write_fmt(args);
        }
    }

    /// Run a code slot with `args` in the scratch buffer. Text the slot
    /// prints is forwarded to the console.
    pub fn exec(&mut self, slot: u16, args: &[u8]) -> i32 {
        self.env.set_args(args);
        let rc = self.loader.exec(slot, self.executor.as_mut(), &mut self.env);
        let out = self.env.take_output();
        self.console.write_bytes(&out);
        rc
    }

    /// Scratch buffer after the last exec.
    pub fn exec_env(&self) -> &ExecEnv {
        &self.env
    }

    /// One lighting frame of host overrides.
    pub fn render(&mut self) -> bool {
        self.rgb.render(&mut self.board)
    }
}
