//! keylink-sim: the protocol engine on a simulated board.
//!
//! ```text
//!  stdin (hex reports) ──▶ LinkService<SimBoard> ──▶ stdout (hex reports)
//!                                   │
//!                                   └──▶ stderr (env_logger)
//! ```
//!
//! Each input line is one report as space-separated hex bytes, zero
//! padded to the packet size. Lines starting with `#` are skipped and
//! `key <row> <col> <0|1>` injects a key event. An optional first
//! argument names a JSON `ProtocolConfig`.

use std::io::{self, BufRead};

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};

use keylink::adapters::sim::SimBoard;
use keylink::adapters::stdout::{HexLineTransport, parse_hex_report};
use keylink::adapters::time::SystemClock;
use keylink::app::ports::Clock;
use keylink::{BUILD_ID, LinkService, MatrixGeometry, ProtocolConfig};

fn load_config() -> Result<ProtocolConfig> {
    let Some(path) = std::env::args().nth(1) else {
        let mut config = ProtocolConfig::default();
        config.cli_enabled = true;
        config.banner = heapless::String::try_from(BUILD_ID).ok();
        return Ok(config);
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config: ProtocolConfig =
        serde_json::from_str(&text).map_err(|e| anyhow!("parsing {path}: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow!("{path}: {e}"))?;
    Ok(config)
}

fn key_event(svc: &mut LinkService<SimBoard>, args: &str) -> Result<()> {
    let v: Vec<u8> = args
        .split_whitespace()
        .map(str::parse)
        .collect::<core::result::Result<_, _>>()
        .context("key event fields")?;
    let &[row, col, pressed] = v.as_slice() else {
        bail!("expected: key <row> <col> <0|1>");
    };
    svc.device_mut().board.set_key(row, col, pressed != 0);
    let keep = svc.on_key_event(row, col, pressed != 0);
    info!("sim: key {row},{col} {} (process={keep})", if pressed != 0 { "down" } else { "up" });
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("{BUILD_ID}");

    let config = load_config()?;
    let packet_size = config.packet_size as usize;
    let flush_timeout = config.flush_timeout_ms;
    let geometry = MatrixGeometry::default();
    let mut svc = LinkService::new(config, SimBoard::new(geometry), geometry)?;

    let clock = SystemClock::new();
    let mut transport = HexLineTransport::new(io::stdout().lock());

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(args) = line.strip_prefix("key ") {
            if let Err(e) = key_event(&mut svc, args) {
                warn!("sim: {e:#}");
            }
        } else if let Some(report) = parse_hex_report(line, packet_size) {
            svc.on_report(&report);
        } else {
            warn!("sim: bad report line {line:?}");
            continue;
        }
        svc.task(clock.now_ms(), &mut transport);
    }

    // Let the console idle timeout expire so buffered text goes out.
    let end = clock.now_ms().wrapping_add(flush_timeout + 1);
    svc.task(end, &mut transport);
    info!("sim: done, {} reports sent, {:?}", transport.sent(), svc.engine().stats());
    Ok(())
}
