//! Scoring rules for combination locks, independent of replication.
use std::collections::VecDeque;
use std::fmt;

use agesync_events::{ButtonId, SdlValue};
use agesync_world::config::MatchPolicy;

/// Marks an unused slot in the replicated attempt buffer
const EMPTY_SLOT: i64 = -1;

/// The most recent presses, oldest first, capped at the solution length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptBuffer {
    capacity: usize,
    presses: VecDeque<ButtonId>,
}

impl AttemptBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            presses: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a press, evicting the oldest when full
    pub fn push(&mut self, button: ButtonId) {
        if self.capacity == 0 {
            return;
        }
        if self.presses.len() == self.capacity {
            self.presses.pop_front();
        }
        self.presses.push_back(button);
    }

    pub fn clear(&mut self) {
        self.presses.clear();
    }

    pub fn len(&self) -> usize {
        self.presses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presses.is_empty()
    }

    pub fn presses(&self) -> Vec<ButtonId> {
        self.presses.iter().copied().collect()
    }

    /// Fixed-arity int tuple: presses first, then empty slots
    pub fn to_value(&self) -> SdlValue {
        SdlValue::ints(
            self.presses
                .iter()
                .map(|b| i64::from(*b))
                .chain(std::iter::repeat(EMPTY_SLOT))
                .take(self.capacity),
        )
    }

    /// Rebuild from a replicated tuple. `None` if the shape does not fit.
    pub fn from_value(value: &SdlValue, capacity: usize) -> Option<Self> {
        let ints = value.to_ints()?;
        if ints.len() != capacity {
            return None;
        }
        let mut buffer = Self::new(capacity);
        for raw in ints.into_iter().filter(|v| *v != EMPTY_SLOT) {
            buffer.push(ButtonId::try_from(raw).ok()?);
        }
        Some(buffer)
    }
}

/// Replicated puzzle state plus the local responder lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleState {
    pub solved: bool,
    pub num_correct: usize,
    pub attempt: AttemptBuffer,
    /// A press responder is playing; further presses are ignored
    pub locked: bool,
}

/// Coarse state for display and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzlePhase {
    Idle,
    /// Some presses are correct
    Locked(usize),
    Solved,
}

impl fmt::Display for PuzzlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PuzzlePhase::Idle => write!(f, "Idle"),
            PuzzlePhase::Locked(n) => write!(f, "Locked({})", n),
            PuzzlePhase::Solved => write!(f, "Solved"),
        }
    }
}

/// Result of scoring one press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Press had no effect
    Ignored,
    /// Press was scored; carries the new correct count
    Progress(usize),
    /// A wrong press discarded earlier progress
    Reset,
    Solved,
    /// A press on a solved lock cleared it
    Unsolved,
}

/// Combination lock scoring
#[derive(Debug, Clone)]
pub struct ComboLockEngine {
    solution: Vec<ButtonId>,
    policy: MatchPolicy,
    disable_on_solve: bool,
    state: PuzzleState,
}

impl ComboLockEngine {
    pub fn new(solution: Vec<ButtonId>, policy: MatchPolicy, disable_on_solve: bool) -> Self {
        let state = PuzzleState {
            solved: false,
            num_correct: 0,
            attempt: AttemptBuffer::new(solution.len()),
            locked: false,
        };
        Self {
            solution,
            policy,
            disable_on_solve,
            state,
        }
    }

    pub fn state(&self) -> &PuzzleState {
        &self.state
    }

    pub fn solution(&self) -> &[ButtonId] {
        &self.solution
    }

    pub fn is_locked(&self) -> bool {
        self.state.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.state.locked = locked;
    }

    pub fn phase(&self) -> PuzzlePhase {
        if self.state.solved {
            PuzzlePhase::Solved
        } else if self.state.num_correct == 0 {
            PuzzlePhase::Idle
        } else {
            PuzzlePhase::Locked(self.state.num_correct)
        }
    }

    /// Score one press
    pub fn press(&mut self, button: ButtonId) -> Transition {
        if self.state.solved {
            if self.disable_on_solve {
                return Transition::Ignored;
            }
            self.state.solved = false;
            self.state.num_correct = 0;
            self.state.attempt.clear();
            return Transition::Unsolved;
        }

        let before = self.state.num_correct;
        self.state.attempt.push(button);
        self.state.num_correct = match self.policy {
            MatchPolicy::Exact => {
                if self.solution.get(before) == Some(&button) {
                    before + 1
                } else {
                    0
                }
            }
            MatchPolicy::Sliding => {
                longest_solution_prefix(&self.state.attempt.presses(), &self.solution)
            }
        };

        if self.state.num_correct == self.solution.len() {
            self.state.solved = true;
            Transition::Solved
        } else if self.state.num_correct == 0 && before > 0 {
            Transition::Reset
        } else {
            Transition::Progress(self.state.num_correct)
        }
    }

    /// Adopt replicated values. Returns false if they were inconsistent
    /// and had to be clamped back to an unsolved, empty state.
    pub fn restore(&mut self, solved: bool, num_correct: i64, attempt: Option<AttemptBuffer>) -> bool {
        let len = self.solution.len();
        let in_range = usize::try_from(num_correct).ok().filter(|n| *n <= len);

        match (in_range, attempt) {
            (Some(n), Some(attempt)) if !solved || n == len => {
                self.state.solved = solved;
                self.state.num_correct = n;
                self.state.attempt = attempt;
                true
            }
            _ => {
                self.state.solved = false;
                self.state.num_correct = 0;
                self.state.attempt = AttemptBuffer::new(len);
                false
            }
        }
    }
}

/// Length of the longest suffix of `presses` that equals a prefix of `solution`
pub fn longest_solution_prefix(presses: &[ButtonId], solution: &[ButtonId]) -> usize {
    let max = presses.len().min(solution.len());
    (1..=max)
        .rev()
        .find(|k| presses[presses.len() - k..] == solution[..*k])
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(policy: MatchPolicy) -> ComboLockEngine {
        ComboLockEngine::new(vec![3, 2, 5, 0], policy, false)
    }

    fn press_all(engine: &mut ComboLockEngine, presses: &[ButtonId]) -> Vec<Transition> {
        presses.iter().map(|b| engine.press(*b)).collect()
    }

    #[test]
    fn test_exact_solves_in_order() {
        let mut lock = engine(MatchPolicy::Exact);
        let transitions = press_all(&mut lock, &[3, 2, 5, 0]);
        assert_eq!(
            transitions,
            vec![
                Transition::Progress(1),
                Transition::Progress(2),
                Transition::Progress(3),
                Transition::Solved
            ]
        );
        assert_eq!(lock.phase(), PuzzlePhase::Solved);
    }

    #[test]
    fn test_exact_wrong_press_resets() {
        let mut lock = engine(MatchPolicy::Exact);
        press_all(&mut lock, &[3, 2]);
        assert_eq!(lock.press(9), Transition::Reset);
        assert_eq!(lock.state().num_correct, 0);
        assert_eq!(lock.press(0), Transition::Progress(0));
        assert!(!lock.state().solved);
    }

    #[test]
    fn test_sliding_recovers_from_leading_garbage() {
        let mut lock = engine(MatchPolicy::Sliding);
        let transitions = press_all(&mut lock, &[9, 3, 2, 5, 0]);
        assert_eq!(transitions.last(), Some(&Transition::Solved));
        assert_eq!(lock.state().attempt.presses(), vec![3, 2, 5, 0]);
    }

    #[test]
    fn test_sliding_keeps_overlapping_prefix() {
        let mut lock = ComboLockEngine::new(vec![1, 1, 2], MatchPolicy::Sliding, false);
        assert_eq!(press_all(&mut lock, &[1, 1, 1]).last(), Some(&Transition::Progress(2)));
        assert_eq!(lock.press(2), Transition::Solved);
    }

    #[test]
    fn test_press_while_solved_unsolves() {
        let mut lock = engine(MatchPolicy::Exact);
        press_all(&mut lock, &[3, 2, 5, 0]);
        assert_eq!(lock.press(3), Transition::Unsolved);
        assert_eq!(lock.phase(), PuzzlePhase::Idle);
        assert!(lock.state().attempt.is_empty());
    }

    #[test]
    fn test_disable_on_solve_ignores_presses() {
        let mut lock = ComboLockEngine::new(vec![1], MatchPolicy::Exact, true);
        assert_eq!(lock.press(1), Transition::Solved);
        assert_eq!(lock.press(1), Transition::Ignored);
        assert_eq!(lock.phase(), PuzzlePhase::Solved);
    }

    #[test]
    fn test_restore_clamps_inconsistent_state() {
        let mut lock = engine(MatchPolicy::Exact);
        assert!(!lock.restore(false, 7, Some(AttemptBuffer::new(4))));
        assert_eq!(lock.state().num_correct, 0);

        assert!(!lock.restore(true, 2, Some(AttemptBuffer::new(4))));
        assert!(!lock.state().solved);

        assert!(!lock.restore(false, 1, None));
        assert!(lock.restore(false, 2, Some(AttemptBuffer::new(4))));
        assert_eq!(lock.phase(), PuzzlePhase::Locked(2));
        assert_eq!(lock.phase().to_string(), "Locked(2)");
    }

    #[test]
    fn test_attempt_buffer_value_shape() {
        let mut buffer = AttemptBuffer::new(4);
        buffer.push(3);
        buffer.push(2);
        assert_eq!(buffer.to_value(), SdlValue::ints([3, 2, -1, -1]));

        let parsed = AttemptBuffer::from_value(&SdlValue::ints([3, 2, -1, -1]), 4).unwrap();
        assert_eq!(parsed, buffer);
        assert!(AttemptBuffer::from_value(&SdlValue::ints([3, 2]), 4).is_none());
        assert!(AttemptBuffer::from_value(&SdlValue::bool(true), 1).is_none());
    }
}
