use crate::models::extraction::ExtractionRuleSet;
use crate::models::question::Module;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Exam,
    ComprehensiveTraining,
    SpecializedTraining,
    MockExam,
}

impl AssessmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::Exam => "exam",
            AssessmentKind::ComprehensiveTraining => "comprehensive_training",
            AssessmentKind::SpecializedTraining => "specialized_training",
            AssessmentKind::MockExam => "mock_exam",
        }
    }

    /// Mock exams are sampled per student; everything else is a fixed paper.
    pub fn is_generated(self) -> bool {
        matches!(self, AssessmentKind::MockExam)
    }
}

/// A gradable unit. Authored elsewhere and read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentDefinition {
    pub id: Uuid,
    pub name: String,
    pub kind: AssessmentKind,
    pub total_score: Decimal,
    pub duration_minutes: i32,
    pub passing_score: Decimal,
    #[serde(default)]
    pub randomize: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub allow_retake: bool,
    #[serde(default)]
    pub max_retake_count: i32,
    #[serde(default)]
    pub extraction_rules: Option<ExtractionRuleSet>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

fn default_enabled() -> bool {
    true
}

impl AssessmentDefinition {
    /// Total number of attempts a student may accumulate for this assessment.
    pub fn max_attempts(&self) -> i64 {
        if self.allow_retake {
            1 + i64::from(self.max_retake_count.max(0))
        } else {
            1
        }
    }
}
