use crate::error::Result;
use crate::models::assessment::{AssessmentDefinition, AssessmentKind};
use crate::models::question::Module;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct DefinitionRow {
    id: Uuid,
    name: String,
    kind: String,
    total_score: Decimal,
    duration_minutes: i32,
    passing_score: Decimal,
    randomize: bool,
    enabled: bool,
    allow_retake: bool,
    max_retake_count: i32,
    extraction_rules: Option<JsonValue>,
    modules: JsonValue,
}

impl TryFrom<DefinitionRow> for AssessmentDefinition {
    type Error = crate::error::Error;

    fn try_from(row: DefinitionRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            kind: serde_json::from_value(JsonValue::String(row.kind))?,
            total_score: row.total_score,
            duration_minutes: row.duration_minutes,
            passing_score: row.passing_score,
            randomize: row.randomize,
            enabled: row.enabled,
            allow_retake: row.allow_retake,
            max_retake_count: row.max_retake_count,
            extraction_rules: row.extraction_rules.map(serde_json::from_value).transpose()?,
            modules: serde_json::from_value(row.modules)?,
        })
    }
}

/// Read-only access to definitions written by the authoring/import side.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn get_definition(&self, id: Uuid) -> Result<Option<AssessmentDefinition>>;

    /// The pool mock exams draw from: every enabled comprehensive training's tree.
    async fn load_bank_modules(&self) -> Result<Vec<Module>>;
}

#[derive(Clone)]
pub struct DefinitionRepository {
    pool: PgPool,
}

impl DefinitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DefinitionSource for DefinitionRepository {
    async fn get_definition(&self, id: Uuid) -> Result<Option<AssessmentDefinition>> {
        let row = sqlx::query_as::<_, DefinitionRow>(
            r#"
            SELECT id, name, kind, total_score, duration_minutes, passing_score, randomize,
                   enabled, allow_retake, max_retake_count, extraction_rules, modules
            FROM assessment_definitions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssessmentDefinition::try_from).transpose()
    }

    async fn load_bank_modules(&self) -> Result<Vec<Module>> {
        let trees: Vec<JsonValue> = sqlx::query_scalar(
            r#"
            SELECT modules FROM assessment_definitions
            WHERE enabled AND kind = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(AssessmentKind::ComprehensiveTraining.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut modules = Vec::new();
        for tree in trees {
            let mut batch: Vec<Module> = serde_json::from_value(tree)?;
            modules.append(&mut batch);
        }
        Ok(modules)
    }
}
