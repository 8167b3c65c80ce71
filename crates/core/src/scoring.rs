//! Progress statistics and final-test verdicts.

/// Snapshot of a learner's numbers, as shown on completion screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub progress_percent: u32,
    pub correct_answers: u32,
    pub total_quizzes: u32,
    pub final_score: u32,
    pub final_total: u32,
}

impl Stats {
    /// Final-test percentage, available once the test has started.
    #[must_use]
    pub fn final_percent(&self) -> Option<u32> {
        (self.final_total > 0).then(|| percent(self.final_score, self.final_total))
    }
}

/// `round(100 * part / whole)`, half rounding up; 0 for an empty whole.
#[must_use]
pub fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = u64::from(part);
    let whole = u64::from(whole);
    let rounded = (200 * part + whole) / (2 * whole);
    u32::try_from(rounded).unwrap_or(u32::MAX)
}

/// How a final-test result is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Excellent,
    Good,
    NeedsReview,
}

impl Verdict {
    #[must_use]
    pub fn from_percent(percent: u32) -> Self {
        match percent {
            80.. => Verdict::Excellent,
            60..=79 => Verdict::Good,
            _ => Verdict::NeedsReview,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(5, 0), 0);
    }

    #[test]
    fn final_percent_needs_a_started_test() {
        let mut stats = Stats {
            progress_percent: 100,
            correct_answers: 0,
            total_quizzes: 0,
            final_score: 0,
            final_total: 0,
        };
        assert_eq!(stats.final_percent(), None);

        stats.final_total = 5;
        stats.final_score = 4;
        assert_eq!(stats.final_percent(), Some(80));
    }

    #[test]
    fn verdict_thresholds() {
        assert_eq!(Verdict::from_percent(100), Verdict::Excellent);
        assert_eq!(Verdict::from_percent(80), Verdict::Excellent);
        assert_eq!(Verdict::from_percent(79), Verdict::Good);
        assert_eq!(Verdict::from_percent(60), Verdict::Good);
        assert_eq!(Verdict::from_percent(59), Verdict::NeedsReview);
    }
}
