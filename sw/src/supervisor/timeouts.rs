//! Opt-in per-attempt timeouts
//!
//! Disabled by default; when the board opts in, the budget maps from the
//! task's current complexity. The supervisor warns once at the warn mark
//! and kills at the kill mark with a non-silence reason.

use std::time::Duration;

use crate::domain::Complexity;

/// Warn/kill budget for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimeout {
    pub warn: Duration,
    pub kill: Duration,
}

impl AttemptTimeout {
    /// A fixed kill budget with the warn mark at half
    pub fn fixed(kill: Duration) -> Self {
        Self { warn: kill / 2, kill }
    }
}

/// Complexity-based defaults
pub fn for_complexity(complexity: Complexity) -> AttemptTimeout {
    let (warn, kill) = match complexity {
        Complexity::Trivial => (480, 1200),
        Complexity::Small => (1200, 3600),
        Complexity::Medium => (3600, 10800),
        Complexity::Large => (10800, 28800),
        Complexity::Unknown => (3600, 14400),
    };
    AttemptTimeout {
        warn: Duration::from_secs(warn),
        kill: Duration::from_secs(kill),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_table() {
        assert_eq!(for_complexity(Complexity::Trivial).warn, Duration::from_secs(480));
        assert_eq!(for_complexity(Complexity::Trivial).kill, Duration::from_secs(1200));
        assert_eq!(for_complexity(Complexity::Small).kill, Duration::from_secs(3600));
        assert_eq!(for_complexity(Complexity::Medium).kill, Duration::from_secs(10800));
        assert_eq!(for_complexity(Complexity::Large).kill, Duration::from_secs(28800));
        assert_eq!(for_complexity(Complexity::Unknown).warn, Duration::from_secs(3600));
        assert_eq!(for_complexity(Complexity::Unknown).kill, Duration::from_secs(14400));
    }

    #[test]
    fn test_warn_always_before_kill() {
        for c in [
            Complexity::Trivial,
            Complexity::Small,
            Complexity::Medium,
            Complexity::Large,
            Complexity::Unknown,
        ] {
            let t = for_complexity(c);
            assert!(t.warn < t.kill);
        }
    }

    #[test]
    fn test_fixed_halves_warn() {
        let t = AttemptTimeout::fixed(Duration::from_secs(600));
        assert_eq!(t.warn, Duration::from_secs(300));
        assert_eq!(t.kill, Duration::from_secs(600));
    }
}
