use crate::config::DecoyFreePolicy;
use crate::hit::SearchHit;
use crate::scoring::score_list::ScoreList;

/// Immutable monotonic step function from raw score to q-value, derived once
/// per completed score list.
///
/// Scanning the pooled scores from highest to lowest while keeping running
/// target and decoy counts, the instantaneous FDR at a threshold is
/// `2 * D / (T + D)`; the factor 2 corrects for the competition assumption
/// that decoys are equally likely to outscore or underscore matching targets.
/// The q-value at a threshold is the minimum instantaneous FDR over all
/// thresholds at which the match would still be accepted, which makes the
/// curve monotone and removes local non-monotonicity from finite-sample
/// noise.
///
#[derive(Debug, Clone)]
pub struct QValueFunction {
    /// Distinct score thresholds, ascending
    thresholds: Vec<f64>,

    /// Instantaneous FDR per threshold
    fdrs: Vec<f64>,

    /// q-value per threshold
    q_values: Vec<f64>,

    /// Decoy-free accept-all mode, every score maps to q-value 0
    accept_all: bool,
}

impl QValueFunction {
    pub fn from_score_list(scores: &ScoreList, decoy_free_policy: DecoyFreePolicy) -> Self {
        if scores.is_decoy_free() {
            return match decoy_free_policy {
                DecoyFreePolicy::AcceptAll => Self {
                    thresholds: Vec::with_capacity(0),
                    fdrs: Vec::with_capacity(0),
                    q_values: Vec::with_capacity(0),
                    accept_all: true,
                },
                DecoyFreePolicy::RankFraction => Self::from_target_ranks(scores.targets()),
            };
        }

        // Pool targets and decoys, descending. Both sequences are already
        // sorted descending (score list postcondition).
        let mut pooled: Vec<(f64, bool)> = Vec::with_capacity(
            scores.targets().len() + scores.decoys().len(),
        );
        pooled.extend(scores.targets().iter().map(|score| (*score, true)));
        pooled.extend(scores.decoys().iter().map(|score| (*score, false)));
        pooled.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        // Instantaneous FDR per distinct threshold, all ties counted
        let mut descending_thresholds: Vec<f64> = Vec::new();
        let mut fdrs_descending: Vec<f64> = Vec::new();
        let mut targets_seen = 0usize;
        let mut decoys_seen = 0usize;
        let mut index = 0usize;
        while index < pooled.len() {
            let threshold = pooled[index].0;
            while index < pooled.len() && pooled[index].0 == threshold {
                if pooled[index].1 {
                    targets_seen += 1;
                } else {
                    decoys_seen += 1;
                }
                index += 1;
            }
            descending_thresholds.push(threshold);
            fdrs_descending
                .push(2.0 * decoys_seen as f64 / (targets_seen + decoys_seen) as f64);
        }

        // q-value: minimum FDR over all thresholds at or below, so the curve
        // is non-increasing in score
        let mut q_descending = fdrs_descending.clone();
        let mut running_min = f64::INFINITY;
        for q in q_descending.iter_mut().rev() {
            running_min = running_min.min(*q);
            *q = running_min;
        }

        descending_thresholds.reverse();
        fdrs_descending.reverse();
        q_descending.reverse();

        Self {
            thresholds: descending_thresholds,
            fdrs: fdrs_descending,
            q_values: q_descending,
            accept_all: false,
        }
    }

    /// Degenerate target-only curve: the q-value of a score is its rank
    /// fraction among all target scores, counted from the top
    ///
    fn from_target_ranks(targets: &[f64]) -> Self {
        let total = targets.len();
        let mut descending_thresholds: Vec<f64> = Vec::new();
        let mut q_descending: Vec<f64> = Vec::new();
        let mut seen = 0usize;
        let mut index = 0usize;
        while index < targets.len() {
            let threshold = targets[index];
            while index < targets.len() && targets[index] == threshold {
                seen += 1;
                index += 1;
            }
            descending_thresholds.push(threshold);
            q_descending.push(seen as f64 / total as f64);
        }
        descending_thresholds.reverse();
        q_descending.reverse();
        Self {
            thresholds: descending_thresholds,
            fdrs: q_descending.clone(),
            q_values: q_descending,
            accept_all: false,
        }
    }

    /// Index of the largest threshold less than or equal to the score
    ///
    fn lookup_index(&self, score: f64) -> Option<usize> {
        let upper = self.thresholds.partition_point(|threshold| *threshold <= score);
        upper.checked_sub(1)
    }

    /// q-value of the score. Scores below every threshold map to 1.0.
    ///
    pub fn q_value(&self, score: f64) -> f64 {
        if self.accept_all {
            return 0.0;
        }
        match self.lookup_index(score) {
            Some(index) => self.q_values[index],
            None => 1.0,
        }
    }

    /// Instantaneous (uncorrected for monotonicity) FDR at the score
    ///
    pub fn instantaneous_fdr(&self, score: f64) -> f64 {
        if self.accept_all {
            return 0.0;
        }
        match self.lookup_index(score) {
            Some(index) => self.fdrs[index],
            None => 1.0,
        }
    }
}

/// Turns a sorted score list into a q-value function and filters hits
/// against a configured FDR threshold
///
pub struct TargetDecoyAnalyzer {
    function: QValueFunction,
}

impl TargetDecoyAnalyzer {
    pub fn new(scores: &ScoreList, decoy_free_policy: DecoyFreePolicy) -> Self {
        Self {
            function: QValueFunction::from_score_list(scores, decoy_free_policy),
        }
    }

    pub fn q_value(&self, score: f64) -> f64 {
        self.function.q_value(score)
    }

    pub fn instantaneous_fdr(&self, score: f64) -> f64 {
        self.function.instantaneous_fdr(score)
    }

    /// Assigns each hit its q-value and keeps the hits accepted at the
    /// threshold: `q_value < threshold`
    ///
    pub fn assign_and_filter(&self, hits: &mut Vec<SearchHit>, threshold: f64) {
        for hit in hits.iter_mut() {
            hit.q_value = self.function.q_value(hit.score);
        }
        hits.retain(|hit| hit.q_value < threshold);
    }
}
