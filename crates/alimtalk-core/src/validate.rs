//! Approval decisions for templates.
//!
//! [`ValidateResult`] is what a classifier produces; [`ValidateResponse`] is
//! the caller-facing rendering returned by `POST /validate/validate`.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Approval class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prediction {
    #[serde(rename = "Approved")]
    Approved,
    #[serde(rename = "Not Approved")]
    NotApproved,
}

impl Prediction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::NotApproved => "Not Approved",
        }
    }
}

/// Per-class probabilities. Either side may be missing when a judge model
/// does not report it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    #[serde(rename = "Approved", default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<f64>,
    #[serde(rename = "Not Approved", default, skip_serializing_if = "Option::is_none")]
    pub not_approved: Option<f64>,
}

impl Probabilities {
    pub fn is_empty(&self) -> bool {
        self.approved.is_none() && self.not_approved.is_none()
    }

    /// Larger class probability, only when both classes are reported.
    pub fn max(&self) -> Option<f64> {
        match (self.approved, self.not_approved) {
            (Some(a), Some(n)) => Some(a.max(n)),
            _ => None,
        }
    }
}

/// A classifier decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidateResult {
    pub prediction: Prediction,
    pub confidence: f64,
    #[serde(default)]
    pub probabilities: Probabilities,
}

impl ValidateResult {
    /// Decision from the two raw logits of a sequence classifier.
    ///
    /// Index 0 is "Not Approved", index 1 is "Approved". Ties resolve to
    /// "Not Approved". `confidence` is the probability of the chosen class.
    pub fn from_logits(logits: [f32; 2]) -> Self {
        let (l0, l1) = (f64::from(logits[0]), f64::from(logits[1]));
        let m = l0.max(l1);
        let (e0, e1) = ((l0 - m).exp(), (l1 - m).exp());
        let sum = e0 + e1;
        let (p0, p1) = (e0 / sum, e1 / sum);

        let (prediction, confidence) = if p1 > p0 {
            (Prediction::Approved, p1)
        } else {
            (Prediction::NotApproved, p0)
        };

        Self {
            prediction,
            confidence,
            probabilities: Probabilities {
                approved: Some(p1),
                not_approved: Some(p0),
            },
        }
    }

    /// Range checks a structured-output backend cannot enforce.
    pub fn check(&self) -> Result<(), String> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        for (label, p) in [
            ("Approved", self.probabilities.approved),
            ("Not Approved", self.probabilities.not_approved),
        ] {
            if let Some(p) = p
                && !in_unit(p)
            {
                return Err(format!("probability for {label} {p} outside [0, 1]"));
            }
        }
        Ok(())
    }

    /// JSON schema handed to structured-output backends.
    pub fn json_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "prediction": { "type": "string", "enum": ["Approved", "Not Approved"] },
                "confidence": { "type": "number" },
                "probabilities": {
                    "type": "object",
                    "properties": {
                        "Approved": { "type": "number" },
                        "Not Approved": { "type": "number" }
                    },
                    "required": ["Approved", "Not Approved"],
                    "additionalProperties": false
                }
            },
            "required": ["prediction", "confidence", "probabilities"],
            "additionalProperties": false
        })
    }
}

/// Caller-facing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Reject,
}

/// Response body of `POST /validate/validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub result: Verdict,
    /// Percentage with two decimals, e.g. `"87.50%"`.
    pub probability: String,
}

impl From<&ValidateResult> for ValidateResponse {
    fn from(r: &ValidateResult) -> Self {
        let result = match r.prediction {
            Prediction::Approved => Verdict::Approve,
            Prediction::NotApproved => Verdict::Reject,
        };
        let p = r.probabilities.max().unwrap_or(r.confidence);
        Self {
            result,
            probability: format!("{:.2}%", p * 100.0),
        }
    }
}
