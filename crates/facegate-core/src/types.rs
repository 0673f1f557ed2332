use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tolerance within which a vector's L2 norm counts as 1.
pub const UNIT_NORM_EPSILON: f32 = 1e-4;

/// Identity of an enrolled person, as assigned by the persistence layer.
pub type PersonId = i64;

/// Axis-aligned face rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// How an embedding's magnitude relates to the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Form {
    /// Arbitrary magnitude; comparisons use full cosine similarity.
    Raw,
    /// L2 norm is 1 within [`UNIT_NORM_EPSILON`]; comparisons use the dot product.
    Unit,
    /// Zero (or non-finite) norm. Never matchable.
    Degenerate,
}

/// Fixed-length identity vector for one face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    values: Vec<f32>,
    form: Form,
}

impl Embedding {
    /// Wrap a vector, classifying it by its L2 norm.
    pub fn new(values: Vec<f32>) -> Self {
        let norm = l2_norm(&values);
        let form = if !norm.is_finite() || norm == 0.0 {
            Form::Degenerate
        } else if (norm - 1.0).abs() <= f64::from(UNIT_NORM_EPSILON) {
            Form::Unit
        } else {
            Form::Raw
        };
        Self { values, form }
    }

    pub(crate) fn with_form(values: Vec<f32>, form: Form) -> Self {
        Self { values, form }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn form(&self) -> Form {
        self.form
    }

    pub fn is_unit(&self) -> bool {
        self.form == Form::Unit
    }

    pub fn is_degenerate(&self) -> bool {
        self.form == Form::Degenerate
    }

    /// L2 norm, kept in `f64` so components near `f32::MAX` stay finite.
    pub fn norm(&self) -> f64 {
        l2_norm(&self.values)
    }
}

pub(crate) fn l2_norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt()
}

/// Capture angle an enrollment embedding was taken at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Angle {
    Front,
    Left,
    Right,
    Up,
    Down,
    Other(String),
}

impl Angle {
    pub fn as_str(&self) -> &str {
        match self {
            Angle::Front => "front",
            Angle::Left => "left",
            Angle::Right => "right",
            Angle::Up => "up",
            Angle::Down => "down",
            Angle::Other(label) => label,
        }
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Angle {
    fn from(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "front" => Angle::Front,
            "left" => Angle::Left,
            "right" => Angle::Right,
            "up" => Angle::Up,
            "down" => Angle::Down,
            _ => Angle::Other(label.trim().to_string()),
        }
    }
}

impl From<String> for Angle {
    fn from(label: String) -> Self {
        Angle::from(label.as_str())
    }
}

impl From<Angle> for String {
    fn from(angle: Angle) -> Self {
        angle.as_str().to_string()
    }
}

impl FromStr for Angle {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Angle::from(s))
    }
}

/// An enrolled embedding as supplied by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEmbedding {
    pub person_id: PersonId,
    pub angle: Angle,
    pub embedding: Embedding,
}

/// Per-frame detector output consumed by the liveness session.
///
/// Probabilities are in `[0, 1]` or absent when the detector did not
/// classify that attribute for the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub left_eye_open: Option<f32>,
    #[serde(default)]
    pub right_eye_open: Option<f32>,
    #[serde(default)]
    pub smile: Option<f32>,
    #[serde(default)]
    pub head_yaw_deg: f32,
    #[serde(default)]
    pub head_pitch_deg: f32,
    pub timestamp_ms: u64,
}

impl FaceObservation {
    /// Observation with no classification data and a level head.
    pub fn at(timestamp_ms: u64, bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            left_eye_open: None,
            right_eye_open: None,
            smile: None,
            head_yaw_deg: 0.0,
            head_pitch_deg: 0.0,
            timestamp_ms,
        }
    }

    pub fn with_eyes(mut self, left: f32, right: f32) -> Self {
        self.left_eye_open = Some(left);
        self.right_eye_open = Some(right);
        self
    }

    pub fn with_smile(mut self, smile: f32) -> Self {
        self.smile = Some(smile);
        self
    }

    pub fn with_head(mut self, yaw_deg: f32, pitch_deg: f32) -> Self {
        self.head_yaw_deg = yaw_deg;
        self.head_pitch_deg = pitch_deg;
        self
    }
}

/// Outcome of matching one query embedding against a corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Set only when `matched` is true.
    pub person_id: Option<PersonId>,
    /// Angle label of the winning entry, set only when `matched` is true.
    pub angle: Option<Angle>,
    /// Best similarity seen, reported even when below threshold.
    pub similarity: f32,
}

impl MatchResult {
    pub fn no_match(similarity: f32) -> Self {
        Self {
            matched: false,
            person_id: None,
            angle: None,
            similarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_classifies_by_norm() {
        assert_eq!(Embedding::new(vec![0.6, 0.8]).form(), Form::Unit);
        assert_eq!(Embedding::new(vec![3.0, 4.0]).form(), Form::Raw);
        assert_eq!(Embedding::new(vec![0.0; 8]).form(), Form::Degenerate);
        assert_eq!(Embedding::new(vec![f32::NAN, 1.0]).form(), Form::Degenerate);
        assert_eq!(Embedding::new(Vec::new()).form(), Form::Degenerate);
        assert_eq!(Embedding::new(vec![f32::MAX, 1.0]).form(), Form::Raw);
    }

    #[test]
    fn test_angle_parsing() {
        assert_eq!(Angle::from("Front"), Angle::Front);
        assert_eq!(Angle::from(" down "), Angle::Down);
        assert_eq!(Angle::from("glasses"), Angle::Other("glasses".into()));
        assert_eq!(Angle::Other("glasses".into()).to_string(), "glasses");
        assert_eq!(String::from(Angle::Left), "left");
    }

    #[test]
    fn test_bounding_box_geometry() {
        let bbox = BoundingBox::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(bbox.center(), (60.0, 45.0));
        assert_eq!(bbox.area(), 5000.0);
    }

    #[test]
    fn test_observation_deserializes_with_missing_fields() {
        let json = r#"{"bounding_box":{"x":1,"y":2,"width":3,"height":4},"timestamp_ms":42}"#;
        let obs: FaceObservation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.timestamp_ms, 42);
        assert_eq!(obs.left_eye_open, None);
        assert_eq!(obs.smile, None);
        assert_eq!(obs.head_yaw_deg, 0.0);
    }
}
