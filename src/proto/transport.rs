//! Transport abstraction — any fixed-size report channel.
//!
//! Concrete implementations:
//! - USB raw HID interrupt endpoint (on target)
//! - stdout hex dump (host simulator)
//! - recording mock (tests)
//!
//! The engine is generic over `Transport`, so adding a new link
//! requires zero changes to the protocol logic.

/// First byte of every report carrying protocol data.
pub const REPORT_DISCRIMINATOR: u8 = 0xFA;

/// Report-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Send one complete report. `report.len()` is always the configured
    /// packet size.
    fn send_report(&mut self, report: &[u8]) -> Result<(), Self::Error>;
}

/// A null transport that discards every report.
/// Useful as a default when no host is attached.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn send_report(&mut self, _report: &[u8]) -> Result<(), ()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn send_report(&mut self, report: &[u8]) -> Result<(), Self::Error> {
        (**self).send_report(report)
    }
}
