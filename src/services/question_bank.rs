use crate::error::{Error, Result};
use crate::models::assessment::AssessmentDefinition;
use crate::models::extraction::ExtractionRule;
use crate::models::question::{Module, OperationPoint, Question};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A question together with where it sits in the catalog.
#[derive(Debug, Clone)]
pub struct IndexedQuestion {
    pub module_id: i64,
    pub module_sort: i32,
    pub subject_id: i64,
    pub subject_sort: i32,
    pub subject_type: Option<String>,
    pub question: Question,
}

impl IndexedQuestion {
    fn sort_key(&self) -> (i32, i64, i32, i64, i32, i64) {
        (
            self.module_sort,
            self.module_id,
            self.subject_sort,
            self.subject_id,
            self.question.sort_order,
            self.question.id,
        )
    }

    pub fn is_eligible(&self) -> bool {
        self.question.enabled && self.question.weight > 0.0 && self.question.weight.is_finite()
    }

    pub fn matches(&self, rule: &ExtractionRule) -> bool {
        rule.module_id.map_or(true, |id| id == self.module_id)
            && rule.subject_id.map_or(true, |id| id == self.subject_id)
            && rule
                .subject_type
                .as_deref()
                .map_or(true, |t| self.subject_type.as_deref() == Some(t))
            && rule
                .question_type
                .as_deref()
                .map_or(true, |t| self.question.question_type.as_deref() == Some(t))
            && rule.kind.map_or(true, |k| k == self.question.kind)
            && rule.matches_difficulty(self.question.difficulty)
    }
}

/// Read-only, sorted view over a module → subject → question → operation
/// point → parameter catalog.
#[derive(Debug, Clone, Default)]
pub struct QuestionBankIndex {
    entries: Vec<IndexedQuestion>,
    by_question: HashMap<i64, usize>,
    by_operation_point: HashMap<i64, usize>,
}

impl QuestionBankIndex {
    pub fn new(modules: &[Module]) -> Result<Self> {
        let mut entries = Vec::new();
        for module in modules {
            for subject in &module.subjects {
                for question in &subject.questions {
                    entries.push(IndexedQuestion {
                        module_id: module.id,
                        module_sort: module.sort_order,
                        subject_id: subject.id,
                        subject_sort: subject.sort_order,
                        subject_type: subject.subject_type.clone(),
                        question: question.clone(),
                    });
                }
            }
        }
        entries.sort_by_key(|e| e.sort_key());

        let mut by_question = HashMap::with_capacity(entries.len());
        let mut by_operation_point = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            let question = &entry.question;
            if question.score < Decimal::ZERO {
                return Err(Error::InvalidQuestionBank(format!(
                    "question {} has a negative score",
                    question.id
                )));
            }
            if by_question.insert(question.id, idx).is_some() {
                return Err(Error::InvalidQuestionBank(format!(
                    "duplicate question id {}",
                    question.id
                )));
            }
            for op in &question.operation_points {
                if by_operation_point.insert(op.id, idx).is_some() {
                    return Err(Error::InvalidQuestionBank(format!(
                        "duplicate operation point id {}",
                        op.id
                    )));
                }
                for param in &op.parameters {
                    if let Some(default) = &param.default_value {
                        param.check(default).map_err(|msg| {
                            Error::InvalidQuestionBank(format!("operation point {}: {}", op.id, msg))
                        })?;
                    }
                }
            }
        }

        Ok(Self {
            entries,
            by_question,
            by_operation_point,
        })
    }

    pub fn from_definition(definition: &AssessmentDefinition) -> Result<Self> {
        Self::new(&definition.modules)
    }

    /// Every question in catalog order.
    pub fn entries(&self) -> &[IndexedQuestion] {
        &self.entries
    }

    /// Enabled, positively weighted questions matching `rule`, in catalog order.
    pub fn eligible<'a>(&'a self, rule: &'a ExtractionRule) -> impl Iterator<Item = &'a IndexedQuestion> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.is_eligible() && e.matches(rule))
    }

    pub fn question(&self, id: i64) -> Option<&IndexedQuestion> {
        self.by_question.get(&id).map(|&idx| &self.entries[idx])
    }

    pub fn operation_point(&self, id: i64) -> Option<&OperationPoint> {
        let entry = &self.entries[*self.by_operation_point.get(&id)?];
        entry.question.operation_points.iter().find(|op| op.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
