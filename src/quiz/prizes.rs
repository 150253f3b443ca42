pub const PRIZE_LEVELS: [u64; 15] = [
    100, 200, 300, 500, 1000, 2000, 4000, 8000, 16000, 32000, 64000, 125000, 250000, 500000,
    1000000,
];

/// Milestone levels (0-based) highlighted on the ladder.
const MILESTONES: [usize; 3] = [4, 9, 14];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeLadder {
    tiers: Vec<u64>,
}

impl Default for PrizeLadder {
    fn default() -> Self {
        Self {
            tiers: PRIZE_LEVELS.to_vec(),
        }
    }
}

impl PrizeLadder {
    pub fn new(tiers: Vec<u64>) -> Self {
        Self { tiers }
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn tier(&self, level: usize) -> Option<u64> {
        self.tiers.get(level).copied()
    }

    pub fn top_prize(&self) -> u64 {
        self.tiers.last().copied().unwrap_or(0)
    }

    /// Prize banked after `completed` questions were answered correctly.
    pub fn prize_for_completed(&self, completed: usize) -> u64 {
        match completed {
            0 => 0,
            n => self.tier(n - 1).unwrap_or_else(|| self.top_prize()),
        }
    }

    pub fn is_milestone(&self, level: usize) -> bool {
        MILESTONES.contains(&level)
    }

    /// Ladder rendered top-down, the way it hangs beside the question.
    pub fn render(&self, current: usize) -> String {
        self.tiers
            .iter()
            .enumerate()
            .rev()
            .map(|(level, prize)| {
                let marker = if level == current {
                    "▶"
                } else if level < current {
                    "✓"
                } else {
                    " "
                };
                let line = format!("{} {:>2}  {}", marker, level + 1, format_prize(*prize));
                if self.is_milestone(level) {
                    format!("<b>{}</b>", line)
                } else {
                    line
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 1000000 -> "1.000.000"
pub fn format_prize(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_tiers_bank_the_previous_level() {
        let ladder = PrizeLadder::default();
        assert_eq!(ladder.prize_for_completed(0), 0);
        assert_eq!(ladder.prize_for_completed(1), 100);
        assert_eq!(ladder.prize_for_completed(5), 1000);
        assert_eq!(ladder.prize_for_completed(15), 1_000_000);
        assert_eq!(ladder.top_prize(), 1_000_000);
    }

    #[test]
    fn prizes_are_grouped_by_thousands() {
        assert_eq!(format_prize(0), "0");
        assert_eq!(format_prize(500), "500");
        assert_eq!(format_prize(16000), "16.000");
        assert_eq!(format_prize(1_000_000), "1.000.000");
    }

    #[test]
    fn ladder_marks_current_and_passed_levels() {
        let ladder = PrizeLadder::new(vec![100, 200, 300]);
        let rendered = ladder.render(1);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("   3"));
        assert!(lines[1].starts_with("▶  2"));
        assert!(lines[2].starts_with("✓  1"));
    }
}
