use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

/// Presentation record returned for a forecast request. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub ticker: String,
    pub horizon_days: u32,
    pub direction: Direction,
    pub confidence: f64,
    pub predicted_change_pct: f64,
    pub strength: Strength,
    pub raw_probability: f64,
    pub current_price: f64,
    pub target_price: f64,
    /// Validation accuracy as a percentage.
    pub model_accuracy: f64,
    pub model_auc: f64,
    pub model_trained_at: String,
    pub data_as_of: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enums_serialize_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::Up).unwrap(), "\"UP\"");
        assert_eq!(serde_json::to_string(&Strength::Moderate).unwrap(), "\"MODERATE\"");
        assert_eq!(Direction::Down.to_string(), "DOWN");
    }
}
