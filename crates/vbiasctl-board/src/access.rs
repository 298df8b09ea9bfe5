use bytes::Bytes;
use vbiasctl_transport::{MacAddr, PacketLink};

use crate::error::Result;
use crate::readings::{GainMode, Reading};
use crate::session::BoardSession;

/// The operations a caller can perform on one selected board.
///
/// Implemented by [`BoardSession`] for direct link access and by the relay
/// client for boards reached through a daemon. Front ends depend only on
/// this trait.
pub trait BoardAccess {
    fn geoaddr(&self) -> u8;

    fn mac_addr(&self) -> MacAddr;

    fn reading(&mut self, reading: Reading) -> Result<f64>;

    fn gain_mode(&mut self) -> Result<GainMode> {
        let volts = self.reading(Reading::Vgainmode)?;
        Ok(GainMode::from_volts(volts))
    }

    fn latch_status(&mut self) -> Result<()>;

    fn passthru_status(&mut self) -> Result<()>;

    fn latch_voltages(&mut self) -> Result<()>;

    fn passthru_voltages(&mut self) -> Result<()>;

    /// Voltage on `channel` as last reported by the board.
    fn voltage(&mut self, channel: usize) -> Result<f64>;

    /// Voltage the next ramp will apply to `channel`.
    fn pending_voltage(&mut self, channel: usize) -> Result<f64>;

    /// Record a ramp target for `channel`.
    fn set_voltage(&mut self, channel: usize, volts: f64) -> Result<()>;

    /// Raw bytes of the most recent frame received from the board.
    fn last_packet(&mut self) -> Result<Option<Bytes>>;

    fn ramp(&mut self) -> Result<()>;

    fn reset(&mut self) -> Result<()>;
}

impl<L: PacketLink> BoardAccess for BoardSession<L> {
    fn geoaddr(&self) -> u8 {
        BoardSession::geoaddr(self)
    }

    fn mac_addr(&self) -> MacAddr {
        BoardSession::mac_addr(self)
    }

    fn reading(&mut self, reading: Reading) -> Result<f64> {
        BoardSession::reading(self, reading)
    }

    fn gain_mode(&mut self) -> Result<GainMode> {
        BoardSession::gain_mode(self)
    }

    fn latch_status(&mut self) -> Result<()> {
        BoardSession::latch_status(self)
    }

    fn passthru_status(&mut self) -> Result<()> {
        BoardSession::passthru_status(self);
        Ok(())
    }

    fn latch_voltages(&mut self) -> Result<()> {
        BoardSession::latch_voltages(self)
    }

    fn passthru_voltages(&mut self) -> Result<()> {
        BoardSession::passthru_voltages(self);
        Ok(())
    }

    fn voltage(&mut self, channel: usize) -> Result<f64> {
        BoardSession::voltage(self, channel)
    }

    fn pending_voltage(&mut self, channel: usize) -> Result<f64> {
        BoardSession::pending_voltage(self, channel)
    }

    fn set_voltage(&mut self, channel: usize, volts: f64) -> Result<()> {
        BoardSession::set_voltage(self, channel, volts)
    }

    fn last_packet(&mut self) -> Result<Option<Bytes>> {
        match BoardSession::last_packet(self) {
            Some(frame) => Ok(Some(frame.to_bytes()?)),
            None => Ok(None),
        }
    }

    fn ramp(&mut self) -> Result<()> {
        BoardSession::ramp(self).map(drop)
    }

    fn reset(&mut self) -> Result<()> {
        BoardSession::reset(self)
    }
}

impl<B: BoardAccess + ?Sized> BoardAccess for Box<B> {
    fn geoaddr(&self) -> u8 {
        (**self).geoaddr()
    }

    fn mac_addr(&self) -> MacAddr {
        (**self).mac_addr()
    }

    fn reading(&mut self, reading: Reading) -> Result<f64> {
        (**self).reading(reading)
    }

    fn gain_mode(&mut self) -> Result<GainMode> {
        (**self).gain_mode()
    }

    fn latch_status(&mut self) -> Result<()> {
        (**self).latch_status()
    }

    fn passthru_status(&mut self) -> Result<()> {
        (**self).passthru_status()
    }

    fn latch_voltages(&mut self) -> Result<()> {
        (**self).latch_voltages()
    }

    fn passthru_voltages(&mut self) -> Result<()> {
        (**self).passthru_voltages()
    }

    fn voltage(&mut self, channel: usize) -> Result<f64> {
        (**self).voltage(channel)
    }

    fn pending_voltage(&mut self, channel: usize) -> Result<f64> {
        (**self).pending_voltage(channel)
    }

    fn set_voltage(&mut self, channel: usize, volts: f64) -> Result<()> {
        (**self).set_voltage(channel, volts)
    }

    fn last_packet(&mut self) -> Result<Option<Bytes>> {
        (**self).last_packet()
    }

    fn ramp(&mut self) -> Result<()> {
        (**self).ramp()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
}
