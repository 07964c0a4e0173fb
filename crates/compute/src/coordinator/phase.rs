use std::fmt;

use serde::Serialize;
use superstep_core::Superstep;

/// Coordinator state machine.
///
/// ```text
/// Init -> Computing(0) -> Barrier(0) -> Computing(1) -> ... -> Barrier(n) -> Terminated
/// ```
///
/// Any non-final phase may move to `Failed`; a barrier may also end in
/// `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Init,
    Computing(Superstep),
    Barrier(Superstep),
    Terminated,
    Cancelled,
    Failed,
}

impl Phase {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Terminated | Self::Cancelled | Self::Failed)
    }

    pub fn can_advance_to(&self, next: &Phase) -> bool {
        match (self, next) {
            (Self::Init, Self::Computing(0)) => true,
            (Self::Computing(n), Self::Barrier(m)) => n == m,
            (Self::Barrier(n), Self::Computing(m)) => *m == n + 1,
            (Self::Barrier(_), Self::Terminated | Self::Cancelled) => true,
            (current, Self::Failed) => !current.is_final(),
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("INIT"),
            Self::Computing(n) => write!(f, "COMPUTING({n})"),
            Self::Barrier(n) => write!(f, "BARRIER({n})"),
            Self::Terminated => f.write_str("TERMINATED"),
            Self::Cancelled => f.write_str("CANCELLED"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(Phase::Init.can_advance_to(&Phase::Computing(0)));
        assert!(Phase::Computing(3).can_advance_to(&Phase::Barrier(3)));
        assert!(Phase::Barrier(3).can_advance_to(&Phase::Computing(4)));
        assert!(Phase::Barrier(3).can_advance_to(&Phase::Terminated));
        assert!(Phase::Computing(1).can_advance_to(&Phase::Failed));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Phase::Init.can_advance_to(&Phase::Computing(1)));
        assert!(!Phase::Computing(3).can_advance_to(&Phase::Barrier(4)));
        assert!(!Phase::Barrier(3).can_advance_to(&Phase::Computing(3)));
        assert!(!Phase::Computing(2).can_advance_to(&Phase::Terminated));
        assert!(!Phase::Terminated.can_advance_to(&Phase::Failed));
        assert!(!Phase::Terminated.can_advance_to(&Phase::Computing(0)));
    }
}
