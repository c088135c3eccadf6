use crate::types::{Direction, Strength};

/// Raw predictor output mapped onto a direction, a direction-relative
/// confidence and a signed percent change. Full precision; rounding happens
/// when the record is assembled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpretation {
    pub direction: Direction,
    /// Percent in `[50, 100]`, relative to the predicted direction.
    pub confidence: f64,
    /// Sign always agrees with `direction`.
    pub predicted_change_pct: f64,
    pub strength: Strength,
}

pub fn interpret(direction_probability: f64, magnitude: f64) -> Interpretation {
    let probability = direction_probability.clamp(0.0, 1.0);
    let (direction, confidence, predicted_change_pct) = if probability > 0.5 {
        (Direction::Up, probability * 100.0, magnitude.abs())
    } else {
        (Direction::Down, (1.0 - probability) * 100.0, -magnitude.abs())
    };

    Interpretation {
        direction,
        confidence,
        predicted_change_pct,
        strength: classify_strength(confidence, predicted_change_pct),
    }
}

/// First match wins: STRONG, then MODERATE, else WEAK.
pub fn classify_strength(confidence: f64, change_pct: f64) -> Strength {
    let magnitude = change_pct.abs();
    if confidence > 70.0 && magnitude > 2.0 {
        Strength::Strong
    } else if confidence > 55.0 && magnitude > 1.0 {
        Strength::Moderate
    } else {
        Strength::Weak
    }
}

pub fn target_price(current_price: f64, change_pct: f64) -> f64 {
    current_price * (1.0 + change_pct / 100.0)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
