use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::FieldErrors;

/// Shared scale for the mood and health fields.
pub const COMMON_LEVELS: &[(i16, &str)] = &[(1, "좋음"), (2, "보통"), (3, "나쁨")];

pub const TEMPERATURE_LEVELS: &[(i16, &str)] = &[(1, "정상"), (2, "미열"), (3, "고열")];

pub const MEAL_LEVELS: &[(i16, &str)] = &[
    (1, "전부 먹음"),
    (2, "절반 먹음"),
    (3, "조금 먹음"),
    (4, "먹지 않음"),
];

pub const FECES_LEVELS: &[(i16, &str)] = &[(1, "정상"), (2, "설사"), (3, "변비"), (4, "없음")];

pub const SLEEP_LEVELS: &[(i16, &str)] = &[
    (1, "3시간 미만"),
    (2, "3~6시간"),
    (3, "6~9시간"),
    (4, "9시간 이상"),
];

/// Display label for a code, `None` when the code is not in the table.
pub fn label(table: &'static [(i16, &'static str)], code: i16) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, l)| *l)
}

/// Health snapshot attached to one report. Every column is a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ReportHealth {
    pub report_id: i64,
    pub mood: Option<i16>,
    pub health: Option<i16>,
    pub temperature: Option<i16>,
    pub meal: Option<i16>,
    pub feces: Option<i16>,
    pub sleep: Option<i16>,
}

/// `health` object of POST /reports. Older clients still send `feeling` and `sleeping`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPayload {
    #[serde(alias = "feeling")]
    pub mood: Option<i16>,
    pub health: Option<i16>,
    pub temperature: Option<i16>,
    pub meal: Option<i16>,
    pub feces: Option<i16>,
    #[serde(alias = "sleeping")]
    pub sleep: Option<i16>,
}

impl HealthPayload {
    fn fields(&self) -> [(&'static str, Option<i16>, &'static [(i16, &'static str)]); 6] {
        [
            ("mood", self.mood, COMMON_LEVELS),
            ("health", self.health, COMMON_LEVELS),
            ("temperature", self.temperature, TEMPERATURE_LEVELS),
            ("meal", self.meal, MEAL_LEVELS),
            ("feces", self.feces, FECES_LEVELS),
            ("sleep", self.sleep, SLEEP_LEVELS),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, code, _)| code.is_none())
    }

    /// Codes outside their table, keyed as `health.<field>`.
    pub fn code_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for (name, code, table) in self.fields() {
            if let Some(code) = code {
                if label(table, code).is_none() {
                    errors.insert(
                        format!("health.{name}"),
                        vec![format!("\"{code}\" is not a valid choice.")],
                    );
                }
            }
        }
        errors
    }
}

/// Health section of a report view, with labels instead of codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthView {
    pub mood: Option<&'static str>,
    pub health: Option<&'static str>,
    pub temperature: Option<&'static str>,
    pub meal: Option<&'static str>,
    pub feces: Option<&'static str>,
    pub sleep: Option<&'static str>,
}

impl From<&ReportHealth> for HealthView {
    fn from(h: &ReportHealth) -> Self {
        let show = |code: Option<i16>, table: &'static [(i16, &'static str)]| {
            code.and_then(|c| label(table, c))
        };
        Self {
            mood: show(h.mood, COMMON_LEVELS),
            health: show(h.health, COMMON_LEVELS),
            temperature: show(h.temperature, TEMPERATURE_LEVELS),
            meal: show(h.meal, MEAL_LEVELS),
            feces: show(h.feces, FECES_LEVELS),
            sleep: show(h.sleep, SLEEP_LEVELS),
        }
    }
}
