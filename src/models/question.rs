use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Anything the external scorer can address and award points for.
pub trait Scoreable {
    fn scoreable_id(&self) -> i64;
    fn max_score(&self) -> Decimal;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Excel,
    Word,
    PowerPoint,
    Windows,
    CSharp,
    Specialized,
}

/// Authored as a level (1..=5) or a label; always written back as the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "DifficultyRepr")]
pub enum Difficulty {
    Easy = 1,
    Medium = 2,
    Hard = 3,
    VeryHard = 4,
    Extreme = 5,
}

impl Difficulty {
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(Difficulty::Easy),
            2 => Some(Difficulty::Medium),
            3 => Some(Difficulty::Hard),
            4 => Some(Difficulty::VeryHard),
            5 => Some(Difficulty::Extreme),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            "very_hard" => Some(Difficulty::VeryHard),
            "extreme" => Some(Difficulty::Extreme),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DifficultyRepr {
    Level(i64),
    Label(String),
}

impl TryFrom<DifficultyRepr> for Difficulty {
    type Error = String;

    fn try_from(repr: DifficultyRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            DifficultyRepr::Level(level) => Difficulty::from_level(level)
                .ok_or_else(|| format!("difficulty level {} is outside 1..=5", level)),
            DifficultyRepr::Label(label) => Difficulty::from_label(&label)
                .ok_or_else(|| format!("unknown difficulty '{}'", label)),
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub name: String,
    pub kind: QuestionKind,
    pub score: Decimal,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub subject_type: Option<String>,
    pub score: Decimal,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub kind: QuestionKind,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub question_type: Option<String>,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub estimated_minutes: i32,
    pub score: Decimal,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub operation_points: Vec<OperationPoint>,
}

impl Scoreable for Question {
    fn scoreable_id(&self) -> i64 {
        self.id
    }

    fn max_score(&self) -> Decimal {
        self.score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPoint {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub score: Decimal,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Scoreable for OperationPoint {
    fn scoreable_id(&self) -> i64 {
        self.id
    }

    fn max_score(&self) -> Decimal {
        self.score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    Text,
    Integer,
    Number,
    Boolean,
    Color,
    Enum,
    FilePath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub enum_options: Vec<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
}

impl Parameter {
    /// Checks a raw value against the parameter's type, enum options and bounds.
    pub fn check(&self, value: &str) -> std::result::Result<(), String> {
        let value = value.trim();
        if value.is_empty() {
            return if self.required {
                Err(format!("parameter '{}' is required", self.name))
            } else {
                Ok(())
            };
        }

        match self.param_type {
            ParameterType::Text | ParameterType::FilePath => Ok(()),
            ParameterType::Boolean => match value.to_lowercase().as_str() {
                "true" | "false" | "1" | "0" => Ok(()),
                _ => Err(format!("parameter '{}' expects a boolean, got '{}'", self.name, value)),
            },
            ParameterType::Color => {
                let hex = value.strip_prefix('#').unwrap_or(value);
                if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    Ok(())
                } else {
                    Err(format!("parameter '{}' expects an RGB color, got '{}'", self.name, value))
                }
            }
            ParameterType::Enum => {
                if self.enum_options.iter().any(|o| o == value) {
                    Ok(())
                } else {
                    Err(format!(
                        "parameter '{}' expects one of [{}], got '{}'",
                        self.name,
                        self.enum_options.join(", "),
                        value
                    ))
                }
            }
            ParameterType::Integer | ParameterType::Number => {
                let parsed = if self.param_type == ParameterType::Integer {
                    value.parse::<i64>().map(|v| v as f64).ok()
                } else {
                    value.parse::<f64>().ok()
                };
                let Some(n) = parsed else {
                    return Err(format!("parameter '{}' expects a number, got '{}'", self.name, value));
                };
                if self.min_value.is_some_and(|min| n < min) || self.max_value.is_some_and(|max| n > max) {
                    return Err(format!("parameter '{}' value {} is out of range", self.name, n));
                }
                Ok(())
            }
        }
    }
}
