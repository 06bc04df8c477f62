// src/evaluator.rs

use crate::constants::{MAX_PERCENT, PASS_THRESHOLD_PERCENT};
use crate::models::QuestionId;
use serde::Serialize;
use std::collections::HashMap;

/// Question id -> correct choice key.
pub type AnswerKey = HashMap<QuestionId, String>;
/// Question id -> choice key picked by the learner.
pub type Submission = HashMap<QuestionId, String>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub correct_count: usize,
    pub total_questions: usize,
    pub percentage: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    pass_threshold: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator {
            pass_threshold: PASS_THRESHOLD_PERCENT,
        }
    }
}

impl Evaluator {
    pub fn new(pass_threshold: f64) -> Self {
        Evaluator { pass_threshold }
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    /// Scores a submission against the key. Unanswered questions count as
    /// wrong; answers to questions outside the key are ignored.
    pub fn evaluate(&self, submission: &Submission, key: &AnswerKey) -> Evaluation {
        let total_questions = key.len();
        let correct_count = key
            .iter()
            .filter(|(qid, correct)| submission.get(*qid) == Some(*correct))
            .count();

        let percentage = if total_questions == 0 {
            0.0
        } else {
            MAX_PERCENT * correct_count as f64 / total_questions as f64
        };

        // An empty quiz cannot be passed, whatever the threshold.
        let passed = total_questions > 0 && percentage >= self.pass_threshold;

        Evaluation {
            correct_count,
            total_questions,
            percentage,
            passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn half_right_fails() {
        let key = map(&[("q1", "a"), ("q2", "b")]);
        let eval = Evaluator::default().evaluate(&map(&[("q1", "a"), ("q2", "c")]), &key);
        assert_eq!(eval.correct_count, 1);
        assert_eq!(eval.percentage, 50.0);
        assert!(!eval.passed);
    }

    #[test]
    fn all_right_passes() {
        let key = map(&[("q1", "a"), ("q2", "b")]);
        let eval = Evaluator::default().evaluate(&map(&[("q1", "a"), ("q2", "b")]), &key);
        assert_eq!(eval.percentage, 100.0);
        assert!(eval.passed);
    }

    #[test]
    fn empty_key_scores_zero_and_fails() {
        let eval = Evaluator::new(0.0).evaluate(&map(&[("q1", "a")]), &AnswerKey::new());
        assert_eq!(eval.total_questions, 0);
        assert_eq!(eval.percentage, 0.0);
        assert!(!eval.passed);
    }

    #[test]
    fn unanswered_is_wrong_and_extras_are_ignored() {
        let key = map(&[("q1", "a"), ("q2", "b"), ("q3", "c")]);
        let sub = map(&[("q1", "a"), ("q2", "b"), ("q9", "d")]);
        let eval = Evaluator::default().evaluate(&sub, &key);
        assert_eq!(eval.correct_count, 2);
        assert_eq!(eval.total_questions, 3);
        assert!(eval.percentage < 100.0);
        assert!(!eval.passed);
    }

    #[test]
    fn threshold_is_inclusive() {
        let key: AnswerKey = (1..=10).map(|i| (format!("q{}", i), "a".to_string())).collect();
        let sub: Submission = (1..=7).map(|i| (format!("q{}", i), "a".to_string())).collect();
        let eval = Evaluator::default().evaluate(&sub, &key);
        assert_eq!(eval.percentage, 70.0);
        assert!(eval.passed);
    }

    #[test]
    fn percentage_stays_in_bounds() {
        let key = map(&[("q1", "a"), ("q2", "b"), ("q3", "c")]);
        for sub in [
            map(&[]),
            map(&[("q1", "a")]),
            map(&[("q1", "a"), ("q2", "b"), ("q3", "c"), ("q4", "x")]),
        ] {
            let eval = Evaluator::default().evaluate(&sub, &key);
            assert!((0.0..=100.0).contains(&eval.percentage));
            assert_eq!(eval.percentage == 100.0, eval.correct_count == key.len());
        }
    }
}
