use std::cmp::Ordering;

/// Target and decoy score sequences of one engine run.
/// Both sequences are sorted descending on construction, a postcondition
/// the target-decoy analysis relies on.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreList {
    targets: Vec<f64>,
    decoys: Vec<f64>,
}

impl ScoreList {
    pub fn new(mut targets: Vec<f64>, mut decoys: Vec<f64>) -> Self {
        sort_descending(&mut targets);
        sort_descending(&mut decoys);
        Self { targets, decoys }
    }

    /// Score list of a target-only run
    ///
    pub fn target_only(targets: Vec<f64>) -> Self {
        Self::new(targets, Vec::with_capacity(0))
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn decoys(&self) -> &[f64] {
        &self.decoys
    }

    pub fn is_decoy_free(&self) -> bool {
        self.decoys.is_empty()
    }
}

fn sort_descending(scores: &mut [f64]) {
    scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sequences_are_sorted_descending() {
        let list = ScoreList::new(vec![4.0, 10.0, 6.0, 8.0], vec![5.0, 9.0]);
        assert_eq!(list.targets(), &[10.0, 8.0, 6.0, 4.0]);
        assert_eq!(list.decoys(), &[9.0, 5.0]);
        for scores in [list.targets(), list.decoys()] {
            for window in scores.windows(2) {
                assert!(window[0] >= window[1]);
            }
        }
    }

    #[test]
    fn test_target_only() {
        let list = ScoreList::target_only(vec![1.0, 3.0, 2.0]);
        assert!(list.is_decoy_free());
        assert_eq!(list.targets(), &[3.0, 2.0, 1.0]);
    }
}
