use crate::error::{Error, Result};
use crate::models::question::{Difficulty, OperationPoint, Question, QuestionKind, Scoreable};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Quota {
    Count(u32),
    /// Share of the configuration's total score, in percent.
    Percent(Decimal),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    #[serde(default)]
    pub module_id: Option<i64>,
    #[serde(default)]
    pub subject_id: Option<i64>,
    #[serde(default)]
    pub subject_type: Option<String>,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub kind: Option<QuestionKind>,
    #[serde(default)]
    pub min_difficulty: Option<Difficulty>,
    #[serde(default)]
    pub max_difficulty: Option<Difficulty>,
    pub quota: Quota,
    pub score_per_question: Decimal,
}

impl ExtractionRule {
    /// Number of questions this rule draws for a configuration worth `total_score`.
    pub fn question_count(&self, total_score: Decimal) -> Result<usize> {
        match self.quota {
            Quota::Count(n) => Ok(n as usize),
            Quota::Percent(p) => {
                if self.score_per_question <= Decimal::ZERO {
                    return Err(Error::InvalidRuleSet(
                        "score_per_question must be positive".to_string(),
                    ));
                }
                let share = total_score * p / Decimal::ONE_HUNDRED;
                let count = share / self.score_per_question;
                if count.fract() != Decimal::ZERO {
                    return Err(Error::InvalidRuleSet(format!(
                        "{}% of {} is not a whole number of {}-point questions",
                        p, total_score, self.score_per_question
                    )));
                }
                count
                    .to_usize()
                    .ok_or_else(|| Error::InvalidRuleSet(format!("negative question count from {}%", p)))
            }
        }
    }

    pub fn matches_difficulty(&self, difficulty: Difficulty) -> bool {
        self.min_difficulty.map_or(true, |min| difficulty >= min)
            && self.max_difficulty.map_or(true, |max| difficulty <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRuleSet {
    pub rules: Vec<ExtractionRule>,
    /// Overwritten from the owning definition before extraction.
    #[serde(default)]
    pub randomize: bool,
}

impl ExtractionRuleSet {
    /// Checks the score-sum invariant. Run when a configuration is saved;
    /// extraction re-checks it and refuses rule sets that fail.
    pub fn validate(&self, total_score: Decimal) -> Result<Vec<usize>> {
        if self.rules.is_empty() {
            return Err(Error::InvalidRuleSet("rule set is empty".to_string()));
        }

        let mut counts = Vec::with_capacity(self.rules.len());
        let mut sum = Decimal::ZERO;
        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.score_per_question <= Decimal::ZERO {
                return Err(Error::InvalidRuleSet(format!(
                    "rule {}: score_per_question must be positive",
                    idx
                )));
            }
            if let (Some(min), Some(max)) = (rule.min_difficulty, rule.max_difficulty) {
                if min > max {
                    return Err(Error::InvalidRuleSet(format!(
                        "rule {}: min_difficulty is above max_difficulty",
                        idx
                    )));
                }
            }
            let count = rule.question_count(total_score)?;
            if count == 0 {
                return Err(Error::InvalidRuleSet(format!("rule {} selects no questions", idx)));
            }
            sum += rule.score_per_question * Decimal::from(count);
            counts.push(count);
        }

        if sum != total_score {
            return Err(Error::InvalidRuleSet(format!(
                "rules add up to {} but the configuration is worth {}",
                sum, total_score
            )));
        }
        Ok(counts)
    }
}

/// One question as it appears in a student's paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedQuestion {
    pub position: usize,
    /// Index of the rule that drew it; `None` for fixed papers.
    pub rule_index: Option<usize>,
    pub module_id: i64,
    pub subject_id: i64,
    pub score: Decimal,
    pub question: Question,
}

impl Scoreable for ExtractedQuestion {
    fn scoreable_id(&self) -> i64 {
        self.question.id
    }

    fn max_score(&self) -> Decimal {
        self.score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedQuestionSet {
    pub seed: u64,
    pub randomized: bool,
    pub questions: Vec<ExtractedQuestion>,
}

impl ExtractedQuestionSet {
    pub fn total_score(&self) -> Decimal {
        self.questions.iter().map(|q| q.max_score()).sum()
    }

    pub fn operation_points(&self) -> impl Iterator<Item = &OperationPoint> {
        self.questions
            .iter()
            .flat_map(|q| q.question.operation_points.iter())
    }

    pub fn operation_point_count(&self) -> usize {
        self.operation_points().count()
    }

    pub fn question_ids(&self) -> Vec<i64> {
        self.questions.iter().map(|q| q.question.id).collect()
    }
}
