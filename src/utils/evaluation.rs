use serde::Serialize;

/// Running confusion counts of detector flags against the optional ground-truth
/// labels carried by readings. Rows without a label are counted but not scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Evaluator {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
    pub unlabeled: usize,
}

/// Precision, recall and F1 of the flags seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with one flag and its label
    pub fn update(&mut self, label: Option<bool>, flagged: bool) {
        match (label, flagged) {
            (None, _) => self.unlabeled += 1,
            (Some(true), true) => self.true_positives += 1,
            (Some(false), true) => self.false_positives += 1,
            (Some(true), false) => self.false_negatives += 1,
            (Some(false), false) => self.true_negatives += 1,
        }
    }

    pub fn update_many<I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (Option<bool>, bool)>,
    {
        for (label, flagged) in pairs {
            self.update(label, flagged);
        }
    }

    pub fn labeled(&self) -> usize {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }

    /// `None` until at least one labelled row was seen.
    pub fn metrics(&self) -> Option<Metrics> {
        if self.labeled() == 0 {
            return None;
        }
        let tp = self.true_positives as f64;
        let fp = self.false_positives as f64;
        let fn_count = self.false_negatives as f64;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_count > 0.0 { tp / (tp + fn_count) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Some(Metrics { precision, recall, f1 })
    }
}
