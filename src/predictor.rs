//! Hour-of-day → traffic category prediction.

use crate::model::{Classifier, ModelError, IN_DIM};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("invalid hour {input:?}: {reason}")]
    InvalidHour { input: String, reason: &'static str },
    #[error("no model loaded")]
    NoModel,
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl PredictError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, PredictError::InvalidHour { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Free,
    Dense,
    Congested,
    Unknown,
}

impl Category {
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Category::Free,
            1 => Category::Dense,
            2 => Category::Congested,
            _ => Category::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Free => "Free",
            Category::Dense => "Dense",
            Category::Congested => "Congested",
            Category::Unknown => "Unknown",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Category::Free => "green",
            Category::Dense => "orange",
            Category::Congested => "red",
            Category::Unknown => "gray",
        }
    }
}

/// What the page shows under the map after a POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub category: Category,
    pub text: String,
    pub color: &'static str,
}

impl PredictionResult {
    /// `hour` is echoed as submitted, so `"08"` reads "for 08 h".
    pub fn new(category: Category, hour: &str) -> Self {
        let text = match category {
            Category::Unknown => "Unknown prediction".to_string(),
            c => format!("Prediction: {} for {} h", c.label(), hour),
        };
        Self {
            category,
            text,
            color: category.color(),
        }
    }

    /// Gray indicator shown when no prediction could be made.
    pub fn failed() -> Self {
        Self {
            category: Category::Unknown,
            text: "Prediction failed".to_string(),
            color: "gray",
        }
    }
}

/// Parse a form value as an hour of day. Out-of-range values are rejected.
pub fn parse_hour(input: &str) -> Result<u8, PredictError> {
    let hour: i64 = input.trim().parse().map_err(|_| PredictError::InvalidHour {
        input: input.to_string(),
        reason: "not an integer",
    })?;
    if !(0..IN_DIM as i64).contains(&hour) {
        return Err(PredictError::InvalidHour {
            input: input.to_string(),
            reason: "must be between 0 and 23",
        });
    }
    Ok(hour as u8)
}

/// Indicator vector for `hour`; an hour past 23 leaves every slot at zero.
pub fn one_hot(hour: u8) -> [f32; IN_DIM] {
    let mut v = [0.0; IN_DIM];
    if let Some(slot) = v.get_mut(usize::from(hour)) {
        *slot = 1.0;
    }
    v
}

/// First index of the highest score; ties go to the lower class.
fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        match best {
            Some((_, b)) if s.total_cmp(&b).is_le() => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Clone)]
pub struct Predictor {
    model: Arc<dyn Classifier>,
}

impl Predictor {
    pub fn new(model: Arc<dyn Classifier>) -> Self {
        Self { model }
    }

    /// Index of the highest-scoring class for `hour`.
    pub fn predict_category(&self, hour: &str) -> Result<usize, PredictError> {
        let h = parse_hour(hour)?;
        self.category_for(h)
    }

    pub fn predict(&self, hour: &str) -> Result<PredictionResult, PredictError> {
        let h = parse_hour(hour)?;
        let idx = self.category_for(h)?;
        Ok(PredictionResult::new(Category::from_index(idx), hour.trim()))
    }

    fn category_for(&self, hour: u8) -> Result<usize, PredictError> {
        let scores = self.model.scores(&one_hot(hour))?;
        argmax(&scores).ok_or(PredictError::Model(ModelError::EmptyOutput))
    }
}
