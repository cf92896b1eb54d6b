use crate::error::{Error, Result};
use crate::models::extraction::{ExtractedQuestion, ExtractedQuestionSet, ExtractionRuleSet};
use crate::services::question_bank::{IndexedQuestion, QuestionBankIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Builds a student's paper from a rule set and a bank snapshot.
///
/// Pure: the same rules, bank and seed always give the same set. When the
/// rule set is not randomized the seed is ignored and each rule takes the
/// first questions in catalog order.
pub struct ExtractionEngine;

impl ExtractionEngine {
    pub fn extract(
        rules: &ExtractionRuleSet,
        total_score: Decimal,
        bank: &QuestionBankIndex,
        seed: u64,
    ) -> Result<ExtractedQuestionSet> {
        let counts = rules.validate(total_score)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut taken: HashSet<i64> = HashSet::new();
        let mut questions = Vec::with_capacity(counts.iter().sum());

        for (rule_index, (rule, &count)) in rules.rules.iter().zip(counts.iter()).enumerate() {
            let pool: Vec<&IndexedQuestion> = bank
                .eligible(rule)
                .filter(|e| !taken.contains(&e.question.id))
                .collect();

            tracing::debug!(
                rule_index,
                available = pool.len(),
                required = count,
                "Extraction rule pool"
            );

            if pool.len() < count {
                return Err(Error::InsufficientPool {
                    rule_index,
                    required: count,
                    available: pool.len(),
                });
            }

            let picked = if rules.randomize {
                weighted_sample(&pool, count, &mut rng)
            } else {
                pool[..count].to_vec()
            };

            for entry in picked {
                taken.insert(entry.question.id);
                questions.push(ExtractedQuestion {
                    position: 0,
                    rule_index: Some(rule_index),
                    module_id: entry.module_id,
                    subject_id: entry.subject_id,
                    score: rule.score_per_question,
                    question: entry.question.clone(),
                });
            }
        }

        if rules.randomize {
            questions.shuffle(&mut rng);
        }
        for (position, q) in questions.iter_mut().enumerate() {
            q.position = position;
        }

        Ok(ExtractedQuestionSet {
            seed,
            randomized: rules.randomize,
            questions,
        })
    }

    /// Materializes a fixed paper: every enabled question of the definition,
    /// at its authored score, shuffled only when `randomize` is set.
    pub fn materialize_fixed(bank: &QuestionBankIndex, randomize: bool, seed: u64) -> ExtractedQuestionSet {
        let mut questions: Vec<ExtractedQuestion> = bank
            .entries()
            .iter()
            .filter(|e| e.question.enabled)
            .map(|e| ExtractedQuestion {
                position: 0,
                rule_index: None,
                module_id: e.module_id,
                subject_id: e.subject_id,
                score: e.question.score,
                question: e.question.clone(),
            })
            .collect();

        if randomize {
            let mut rng = StdRng::seed_from_u64(seed);
            questions.shuffle(&mut rng);
        }
        for (position, q) in questions.iter_mut().enumerate() {
            q.position = position;
        }

        ExtractedQuestionSet {
            seed,
            randomized: randomize,
            questions,
        }
    }
}

/// Weighted sampling without replacement (Efraimidis–Spirakis): each item
/// gets key `ln(u) / w` and the `count` largest keys win.
fn weighted_sample<'a>(
    pool: &[&'a IndexedQuestion],
    count: usize,
    rng: &mut StdRng,
) -> Vec<&'a IndexedQuestion> {
    let mut keyed: Vec<(f64, &'a IndexedQuestion)> = pool
        .iter()
        .map(|&entry| {
            let u: f64 = 1.0 - rng.gen::<f64>();
            (u.ln() / entry.question.weight, entry)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.into_iter().take(count).map(|(_, e)| e).collect()
}
