//! Warm-up / detection phase tracking.

/// Processing phase of the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Learn only; every emitted record is neutral
    Warmup,
    /// Score and classify
    Active,
}

/// Counts samples and decides the phase of each one.
///
/// Sample `i` (1-based) is in warm-up while `i <= start_index`. The transition
/// to [`Phase::Active`] happens once and is never undone.
#[derive(Debug, Clone)]
pub struct PhaseController {
    counter: u64,
    start_index: u64,
}

impl PhaseController {
    pub fn new(start_index: u64) -> Self {
        PhaseController {
            counter: 0,
            start_index,
        }
    }

    /// Count one more sample and return its index and phase.
    ///
    /// `entered_active` is true only on the call that crosses the boundary.
    pub fn advance(&mut self) -> Step {
        self.counter += 1;
        Step {
            index: self.counter,
            phase: self.phase_of(self.counter),
            entered_active: self.counter == self.start_index + 1,
        }
    }

    /// Phase a given 1-based sample index belongs to
    pub fn phase_of(&self, index: u64) -> Phase {
        if index <= self.start_index {
            Phase::Warmup
        } else {
            Phase::Active
        }
    }

    pub fn current(&self) -> Phase {
        self.phase_of(self.counter)
    }

    pub fn samples_seen(&self) -> u64 {
        self.counter
    }

    pub fn start_index(&self) -> u64 {
        self.start_index
    }
}

/// Outcome of [`PhaseController::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub index: u64,
    pub phase: Phase,
    pub entered_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_once_after_start_index() {
        let mut pc = PhaseController::new(2);
        assert_eq!(pc.current(), Phase::Warmup);

        let steps: Vec<Step> = (0..4).map(|_| pc.advance()).collect();
        let phases: Vec<Phase> = steps.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![Phase::Warmup, Phase::Warmup, Phase::Active, Phase::Active]
        );
        let entered: Vec<bool> = steps.iter().map(|s| s.entered_active).collect();
        assert_eq!(entered, vec![false, false, true, false]);
        assert_eq!(pc.samples_seen(), 4);
    }

    #[test]
    fn zero_warmup_is_active_from_first_sample() {
        let mut pc = PhaseController::new(0);
        let step = pc.advance();
        assert_eq!(step.phase, Phase::Active);
        assert!(step.entered_active);
    }
}
