//! Bounded-step voltage ramping.
//!
//! A ramp moves every pending channel toward its target in steps of at most
//! `max_step` DAC codes, writing only the channels that still move. Each
//! write is verified by the board's echo, so a ramp stops at the first
//! integrity failure.

use std::collections::BTreeMap;
use std::thread;

use tracing::{debug, info};
use vbiasctl_frame::{ProgramRequest, VoltageCodes, CHANNELS};
use vbiasctl_transport::PacketLink;

use crate::error::{BoardError, Result};
use crate::session::{BoardSession, SessionState};

/// Final codes for all channels: pending targets over the current codes.
pub fn targets(current: &VoltageCodes, pending: &BTreeMap<usize, u16>) -> [u16; CHANNELS] {
    let mut out = current.0;
    for (&chan, &code) in pending.iter().filter(|(&chan, _)| chan < CHANNELS) {
        out[chan] = code;
    }
    out
}

/// The next write toward `target`, or `None` once every channel has arrived.
pub fn plan_step(
    current: &[u16; CHANNELS],
    target: &[u16; CHANNELS],
    max_step: u16,
) -> Option<ProgramRequest> {
    let max_step = i32::from(max_step.max(1));
    let mut mask = 0u32;
    let mut codes = *current;
    for chan in 0..CHANNELS {
        let delta = i32::from(target[chan]) - i32::from(current[chan]);
        if delta == 0 {
            continue;
        }
        let step = delta.clamp(-max_step, max_step);
        // Both ends are valid codes, so the stepped value is too.
        codes[chan] = (i32::from(current[chan]) + step) as u16;
        mask |= 1 << chan;
    }
    (mask != 0).then(|| ProgramRequest::new(mask, codes))
}

/// Steps needed to cover the largest distance between `current` and `target`.
pub fn step_bound(current: &[u16; CHANNELS], target: &[u16; CHANNELS], max_step: u16) -> u32 {
    let max_step = u32::from(max_step.max(1));
    let widest = current
        .iter()
        .zip(target)
        .map(|(&c, &t)| u32::from(c.abs_diff(t)))
        .max()
        .unwrap_or(0);
    widest.div_ceil(max_step)
}

impl<L: PacketLink> BoardSession<L> {
    /// Drive every pending channel to its target and clear the pending set.
    ///
    /// Returns the number of writes issued. With nothing pending the board
    /// is not contacted at all.
    pub fn ramp(&mut self) -> Result<u32> {
        if self.pending().is_empty() {
            return Ok(0);
        }
        if self.state() == SessionState::Faulted {
            return Err(BoardError::Faulted {
                geoaddr: self.geoaddr(),
            });
        }

        self.fetch_voltages()?;
        let target = targets(self.voltages(), self.pending());
        let ramp = self.config().ramp.clone();
        info!(
            geoaddr = self.geoaddr(),
            channels = self.pending().len(),
            steps = step_bound(&self.voltages().0, &target, ramp.max_step),
            "ramping"
        );

        let mut steps = 0u32;
        loop {
            let current = self.voltages().0;
            let Some(step) = plan_step(&current, &target, ramp.max_step) else {
                break;
            };
            if steps >= ramp.max_iterations {
                return Err(BoardError::RampIncomplete { iterations: steps });
            }
            if steps > 0 && !ramp.step_delay.is_zero() {
                thread::sleep(ramp.step_delay);
            }
            self.set_voltages(step.mask, &step.codes)?;
            steps += 1;
            debug!(geoaddr = self.geoaddr(), step = steps, mask = step.mask, "ramp step");
        }

        self.clear_pending();
        info!(geoaddr = self.geoaddr(), steps, "ramp complete");
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(pairs: &[(usize, u16)]) -> [u16; CHANNELS] {
        let mut out = [0; CHANNELS];
        for &(chan, code) in pairs {
            out[chan] = code;
        }
        out
    }

    #[test]
    fn targets_overlay_pending() {
        let current = VoltageCodes(codes(&[(0, 5), (1, 6)]));
        let pending = BTreeMap::from([(1, 100), (31, 7)]);
        let t = targets(&current, &pending);
        assert_eq!(t[0], 5);
        assert_eq!(t[1], 100);
        assert_eq!(t[31], 7);
    }

    #[test]
    fn step_is_clamped_both_ways() {
        let current = codes(&[(0, 0), (1, 50), (2, 20)]);
        let target = codes(&[(0, 25), (1, 45), (2, 20)]);
        let step = plan_step(&current, &target, 10).expect("channels still move");
        assert_eq!(step.mask, 0b011);
        assert_eq!(step.codes[0], 10);
        assert_eq!(step.codes[1], 45);
        assert_eq!(step.codes[2], 20);
    }

    #[test]
    fn arrived_channels_plan_nothing() {
        let current = codes(&[(3, 9)]);
        assert!(plan_step(&current, &current, 10).is_none());
    }

    #[test]
    fn zero_step_still_progresses() {
        let current = codes(&[]);
        let target = codes(&[(0, 2)]);
        assert_eq!(plan_step(&current, &target, 0).unwrap().codes[0], 1);
    }

    #[test]
    fn step_bound_uses_widest_gap() {
        let current = codes(&[(0, 0), (1, 100)]);
        let target = codes(&[(0, 25), (1, 99)]);
        assert_eq!(step_bound(&current, &target, 10), 3);
        assert_eq!(step_bound(&current, &current, 10), 0);
    }

    #[test]
    fn stepped_sequence_reaches_target() {
        let mut current = codes(&[(0, 0), (7, 0x3fff)]);
        let target = codes(&[(0, 0x3fff), (7, 0)]);
        let mut steps = 0;
        while let Some(step) = plan_step(&current, &target, 10) {
            current = step.codes;
            steps += 1;
        }
        assert_eq!(current, target);
        assert_eq!(steps, step_bound(&codes(&[(0, 0)]), &codes(&[(0, 0x3fff)]), 10));
    }
}
