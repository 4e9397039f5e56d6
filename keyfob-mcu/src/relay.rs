//! Relay outputs and the pulse actuator
//!
//! Each action closes one optocoupler for a fixed hold time and opens it
//! again. The open is done by a drop guard, so the pin goes low on every
//! way out of [`RelayActuator::actuate`], unwinding included.

use log::*;

use crate::error::RelayError;
use crate::pins::{OutputPin, Timer};
use keyfob_proto::Action;

/// A physical relay circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Circuit {
    Lock,
    Unlock,
}

impl Circuit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Circuit::Lock => "lock",
            Circuit::Unlock => "unlock",
        }
    }
}

impl From<Action> for Circuit {
    fn from(action: Action) -> Self {
        match action {
            Action::Lock => Circuit::Lock,
            Action::Unlock => Circuit::Unlock,
        }
    }
}

impl std::fmt::Display for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    Released,
    Asserted,
}

/// One relay circuit and its drive pin
pub struct RelayOutput<P> {
    circuit: Circuit,
    pin: P,
    state: DriveState,
    deadline: Option<u64>,
}

impl<P: OutputPin> RelayOutput<P> {
    /// Take ownership of the pin and drive it low
    pub fn new(circuit: Circuit, pin: P) -> Result<Self, RelayError> {
        let mut output = Self {
            circuit,
            pin,
            state: DriveState::Asserted,
            deadline: None,
        };
        output.release()?;
        Ok(output)
    }

    pub fn circuit(&self) -> Circuit {
        self.circuit
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    /// Time by which an asserted output must be released
    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    fn assert(&mut self, deadline: u64) -> Result<(), RelayError> {
        self.state = DriveState::Asserted;
        self.deadline = Some(deadline);
        if let Err(e) = self.pin.set_high() {
            let err = self.pin_error(e);
            // The pin may have moved before failing
            if let Err(release) = self.release() {
                error!("Release after failed assert also failed: {}", release);
            }
            return Err(err);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), RelayError> {
        match self.pin.set_low() {
            Ok(()) => {
                self.state = DriveState::Released;
                self.deadline = None;
                Ok(())
            }
            // Stays Asserted so the overdue sweep retries
            Err(e) => Err(self.pin_error(e)),
        }
    }

    fn pin_error(&self, e: P::Error) -> RelayError {
        RelayError::Pin {
            circuit: self.circuit,
            detail: format!("{:?}", e),
        }
    }
}

/// Releases its output when dropped unless [`Pulse::finish`] already did
struct Pulse<'a, P: OutputPin> {
    output: Option<&'a mut RelayOutput<P>>,
}

impl<'a, P: OutputPin> Pulse<'a, P> {
    fn start(output: &'a mut RelayOutput<P>, deadline: u64) -> Result<Self, RelayError> {
        output.assert(deadline)?;
        Ok(Self {
            output: Some(output),
        })
    }

    fn finish(mut self) -> Result<(), RelayError> {
        match self.output.take() {
            Some(output) => output.release(),
            None => Ok(()),
        }
    }
}

impl<P: OutputPin> Drop for Pulse<'_, P> {
    fn drop(&mut self) {
        if let Some(output) = self.output.take() {
            if let Err(e) = output.release() {
                error!("Release on abort failed: {}", e);
            }
        }
    }
}

/// Drives the lock and unlock circuits
pub struct RelayActuator<P, T> {
    lock: RelayOutput<P>,
    unlock: RelayOutput<P>,
    timer: T,
    hold_ms: u32,
}

impl<P: OutputPin, T: Timer> RelayActuator<P, T> {
    pub fn new(lock_pin: P, unlock_pin: P, timer: T, hold_ms: u32) -> Result<Self, RelayError> {
        Ok(Self {
            lock: RelayOutput::new(Circuit::Lock, lock_pin)?,
            unlock: RelayOutput::new(Circuit::Unlock, unlock_pin)?,
            timer,
            hold_ms,
        })
    }

    pub fn output(&self, circuit: Circuit) -> &RelayOutput<P> {
        match circuit {
            Circuit::Lock => &self.lock,
            Circuit::Unlock => &self.unlock,
        }
    }

    pub fn hold_ms(&self) -> u32 {
        self.hold_ms
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Pulse the circuit for `action`, blocking for the hold time
    ///
    /// Refused if any circuit is still asserted, so two pulses never overlap.
    pub fn actuate(&mut self, action: Action) -> Result<(), RelayError> {
        let circuit = Circuit::from(action);

        if let Some(asserted) = self.asserted() {
            return Err(RelayError::Busy { circuit, asserted });
        }

        let deadline = self.timer.now_ms() + u64::from(self.hold_ms);
        let output = match circuit {
            Circuit::Lock => &mut self.lock,
            Circuit::Unlock => &mut self.unlock,
        };

        let pulse = Pulse::start(output, deadline)?;
        debug!("{} circuit asserted until t={}ms", circuit, deadline);
        self.timer.delay_ms(self.hold_ms);
        pulse.finish()?;
        debug!("{} circuit released", circuit);

        Ok(())
    }

    /// Release every output whose deadline has passed
    ///
    /// Run from the polling loop; catches outputs whose release failed.
    pub fn release_overdue(&mut self) -> Vec<Circuit> {
        let now = self.timer.now_ms();
        let mut released = Vec::new();

        for output in [&mut self.lock, &mut self.unlock] {
            let overdue = output.state == DriveState::Asserted
                && output.deadline.is_none_or(|deadline| now >= deadline);
            if !overdue {
                continue;
            }
            match output.release() {
                Ok(()) => {
                    warn!("{} circuit was past its deadline, released", output.circuit);
                    released.push(output.circuit);
                }
                Err(e) => error!("Overdue release failed: {}", e),
            }
        }

        released
    }

    fn asserted(&self) -> Option<Circuit> {
        [&self.lock, &self.unlock]
            .into_iter()
            .find(|output| output.state == DriveState::Asserted)
            .map(|output| output.circuit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::Bench;

    fn actuator(bench: &Bench) -> RelayActuator<crate::mock::FakePin, crate::mock::FakeTimer> {
        let relays =
            RelayActuator::new(bench.pin("lock"), bench.pin("unlock"), bench.timer(), 300).unwrap();
        bench.clear_trace();
        relays
    }

    #[test]
    fn outputs_start_released() {
        let bench = Bench::new();
        let relays = RelayActuator::new(bench.pin("lock"), bench.pin("unlock"), bench.timer(), 300)
            .unwrap();
        assert_eq!(relays.output(Circuit::Lock).state(), DriveState::Released);
        assert_eq!(relays.output(Circuit::Unlock).state(), DriveState::Released);
        assert_eq!(bench.pin_edges("lock"), vec![(false, 0)]);
        assert_eq!(bench.pin_edges("unlock"), vec![(false, 0)]);
    }

    #[test]
    fn lock_pulse_holds_for_exactly_hold_ms() {
        let bench = Bench::new();
        bench.advance(1_000);
        let mut relays = actuator(&bench);

        relays.actuate(Action::Lock).unwrap();

        assert_eq!(bench.pin_edges("lock"), vec![(true, 1_000), (false, 1_300)]);
        assert!(bench.pin_edges("unlock").is_empty());
        assert_eq!(relays.output(Circuit::Lock).state(), DriveState::Released);
        assert_eq!(relays.output(Circuit::Lock).deadline(), None);
        assert_eq!(bench.now(), 1_300);
    }

    #[test]
    fn unlock_drives_only_the_unlock_pin() {
        let bench = Bench::new();
        let mut relays = actuator(&bench);

        relays.actuate(Action::Unlock).unwrap();

        assert_eq!(bench.pin_edges("unlock"), vec![(true, 0), (false, 300)]);
        assert!(bench.pin_edges("lock").is_empty());
    }

    #[test]
    fn configured_hold_time_is_used() {
        let bench = Bench::new();
        let mut relays =
            RelayActuator::new(bench.pin("lock"), bench.pin("unlock"), bench.timer(), 750).unwrap();
        bench.clear_trace();

        relays.actuate(Action::Lock).unwrap();

        assert_eq!(bench.pin_edges("lock"), vec![(true, 0), (false, 750)]);
    }

    #[test]
    fn failed_assert_leaves_pin_low() {
        let bench = Bench::new();
        let mut relays = RelayActuator::new(
            bench.pin_failing_high("lock"),
            bench.pin("unlock"),
            bench.timer(),
            300,
        )
        .unwrap();
        bench.clear_trace();

        let err = relays.actuate(Action::Lock).unwrap_err();

        assert!(matches!(err, RelayError::Pin { circuit: Circuit::Lock, .. }));
        assert_eq!(bench.pin_edges("lock"), vec![(false, 0)]);
        assert_eq!(relays.output(Circuit::Lock).state(), DriveState::Released);
        // No hold time was spent
        assert_eq!(bench.now(), 0);
    }

    #[test]
    fn failed_assert_with_stuck_release_stays_overdue() {
        let bench = Bench::new();
        let mut relays = RelayActuator::new(
            bench.pin_failing_high("lock"),
            bench.pin("unlock"),
            bench.timer(),
            300,
        )
        .unwrap();
        bench.clear_trace();
        bench.fail_low("lock", true);

        // The assert error is reported; the failed cleanup is only logged
        let err = relays.actuate(Action::Lock).unwrap_err();
        assert!(matches!(err, RelayError::Pin { circuit: Circuit::Lock, ref detail } if detail.contains("driver fault")));
        assert_eq!(relays.output(Circuit::Lock).state(), DriveState::Asserted);
        assert_eq!(relays.output(Circuit::Lock).deadline(), Some(300));

        bench.fail_low("lock", false);
        bench.advance(300);
        assert_eq!(relays.release_overdue(), vec![Circuit::Lock]);
        assert_eq!(relays.output(Circuit::Lock).state(), DriveState::Released);
    }

    #[test]
    fn stuck_release_blocks_the_next_pulse_until_swept() {
        let bench = Bench::new();
        let mut relays = actuator(&bench);

        bench.fail_low("lock", true);
        assert!(relays.actuate(Action::Lock).is_err());
        assert_eq!(relays.output(Circuit::Lock).state(), DriveState::Asserted);

        let err = relays.actuate(Action::Unlock).unwrap_err();
        assert!(matches!(
            err,
            RelayError::Busy {
                circuit: Circuit::Unlock,
                asserted: Circuit::Lock
            }
        ));

        bench.fail_low("lock", false);
        assert_eq!(relays.release_overdue(), vec![Circuit::Lock]);
        assert_eq!(relays.output(Circuit::Lock).state(), DriveState::Released);

        relays.actuate(Action::Unlock).unwrap();
    }

    #[test]
    fn sweep_leaves_healthy_outputs_alone() {
        let bench = Bench::new();
        let mut relays = actuator(&bench);
        relays.actuate(Action::Lock).unwrap();
        bench.advance(10_000);

        assert!(relays.release_overdue().is_empty());
        assert_eq!(bench.pin_edges("lock").len(), 2);
    }

    #[test]
    fn release_runs_when_the_hold_is_interrupted() {
        let bench = Bench::new();
        let mut relays = actuator(&bench);
        bench.panic_on_delay(true);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = relays.actuate(Action::Unlock);
        }));

        assert!(result.is_err());
        assert_eq!(bench.pin_edges("unlock"), vec![(true, 0), (false, 0)]);
    }
}
