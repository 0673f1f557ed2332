//! Active liveness detection by accumulating behavioural signals.
//!
//! A verification attempt owns one [`LivenessSession`]. Every analysed frame
//! feeds a [`FaceObservation`] (and optionally the face crop) into
//! [`LivenessSession::step`], which evaluates each signal against the
//! session's previous state. Once a signal fires it stays set until
//! [`LivenessSession::reset`]; timed signals additionally carry a debounce
//! window before they may fire again.
//!
//! The verdict is a score over the set signals, compared against a minimum
//! score. [`LivenessPolicy`] selects the weights and whether the per-frame
//! texture check is a hard gate.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Static photographs (no blink, no expression, no pose change),
//!   and with the texture gate, flat prints and noisy screen replays.
//! - **Does not block:** Video replays of a person performing the gestures,
//!   or 3D masks with moving eyelids.

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

use crate::texture::{self, TextureBounds, TextureReport};
use crate::types::FaceObservation;

/// One liveness cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Blink,
    Smile,
    ExpressionChange,
    HeadTurn,
    HeadNod,
    Movement,
    SizeChange,
    Texture,
}

impl Signal {
    pub const ALL: [Signal; 8] = [
        Signal::Blink,
        Signal::Smile,
        Signal::ExpressionChange,
        Signal::HeadTurn,
        Signal::HeadNod,
        Signal::Movement,
        Signal::SizeChange,
        Signal::Texture,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Compact set of signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSet(u8);

impl SignalSet {
    pub fn insert(&mut self, signal: Signal) {
        self.0 |= signal.bit();
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.0 & signal.bit() != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Signal> {
        let set = *self;
        Signal::ALL.into_iter().filter(move |s| set.contains(*s))
    }
}

impl Serialize for SignalSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for signal in self.iter() {
            seq.serialize_element(&signal)?;
        }
        seq.end()
    }
}

/// Scoring strategy. One policy applies to a whole deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessPolicy {
    /// Seven behavioural signals, one point each. Texture is reported but
    /// does not count.
    #[default]
    Behavioral,
    /// Movement 1, blink 2, smile 1, texture 3; the current frame's texture
    /// check must pass regardless of score.
    TextureGated,
}

impl LivenessPolicy {
    pub fn weight(&self, signal: Signal) -> u32 {
        match self {
            LivenessPolicy::Behavioral => match signal {
                Signal::Texture => 0,
                _ => 1,
            },
            LivenessPolicy::TextureGated => match signal {
                Signal::Movement => 1,
                Signal::Blink => 2,
                Signal::Smile => 1,
                Signal::Texture => 3,
                _ => 0,
            },
        }
    }

    pub fn requires_texture(&self) -> bool {
        matches!(self, LivenessPolicy::TextureGated)
    }

    pub fn max_score(&self) -> u32 {
        Signal::ALL.iter().map(|s| self.weight(*s)).sum()
    }
}

impl fmt::Display for LivenessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessPolicy::Behavioral => f.write_str("behavioral"),
            LivenessPolicy::TextureGated => f.write_str("texture_gated"),
        }
    }
}

impl FromStr for LivenessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "behavioral" | "behavioural" => Ok(LivenessPolicy::Behavioral),
            "texture_gated" => Ok(LivenessPolicy::TextureGated),
            other => Err(format!("unknown liveness policy '{other}'")),
        }
    }
}

/// Thresholds and windows for every signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub policy: LivenessPolicy,
    /// Minimum score for a live verdict.
    pub min_score: u32,
    /// Both eyes above this arm the blink detector.
    pub eyes_open_threshold: f32,
    /// Both eyes below this count as closed.
    pub eyes_closed_threshold: f32,
    pub blink_debounce_ms: u64,
    pub smile_threshold: f32,
    pub smile_debounce_ms: u64,
    /// Minimum change in smile probability between consecutive frames.
    pub expression_delta: f32,
    pub head_turn_deg: f32,
    pub head_turn_debounce_ms: u64,
    pub head_nod_deg: f32,
    pub head_nod_debounce_ms: u64,
    /// Minimum bounding-box centre displacement, in pixels.
    pub movement_px: f32,
    /// Movement is evaluated once this long has elapsed since session start.
    pub movement_warmup_ms: u64,
    /// Minimum relative change in bounding-box area.
    pub size_change_ratio: f32,
    pub texture: TextureBounds,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            policy: LivenessPolicy::default(),
            min_score: 3,
            eyes_open_threshold: 0.7,
            eyes_closed_threshold: 0.3,
            blink_debounce_ms: 1000,
            smile_threshold: 0.7,
            smile_debounce_ms: 1500,
            expression_delta: 0.3,
            head_turn_deg: 20.0,
            head_turn_debounce_ms: 1500,
            head_nod_deg: 15.0,
            head_nod_debounce_ms: 1500,
            movement_px: 20.0,
            movement_warmup_ms: 1000,
            size_change_ratio: 0.2,
            texture: TextureBounds::default(),
        }
    }
}

/// Outcome of one [`LivenessSession::step`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessVerdict {
    pub is_live: bool,
    pub score: u32,
    /// Sticky signals set so far this session.
    pub detected: SignalSet,
    /// Signals whose trigger was accepted on this frame. A debounced
    /// re-trigger shows up here even though the sticky set is unchanged.
    pub fired: SignalSet,
    /// Texture check of this frame's crop, if one was supplied.
    pub texture: Option<TextureReport>,
}

impl LivenessVerdict {
    pub fn accepted(&self, signal: Signal) -> bool {
        self.fired.contains(signal)
    }
}

/// Last accepted trigger time per debounced signal.
#[derive(Debug, Clone, Copy, Default)]
struct Debounce {
    blink: Option<u64>,
    smile: Option<u64>,
    head_turn: Option<u64>,
    head_nod: Option<u64>,
}

/// Fire a debounced signal if its window has elapsed. Returns whether it fired.
fn debounced(last: &mut Option<u64>, now: u64, window_ms: u64) -> bool {
    let ready = match *last {
        None => true,
        Some(at) => now.saturating_sub(at) > window_ms,
    };
    if ready {
        *last = Some(now);
    }
    ready
}

/// Mutable liveness state for one verification attempt.
///
/// Not shared between attempts: call [`reset`](Self::reset) (or build a new
/// session) at each attempt boundary, otherwise signals from the previous
/// attempt carry over.
#[derive(Debug, Clone)]
pub struct LivenessSession {
    config: LivenessConfig,
    started_at_ms: Option<u64>,
    debounce: Debounce,
    detected: SignalSet,
    blink_armed: bool,
    prev_center: Option<(f32, f32)>,
    prev_area: Option<f32>,
    prev_smile: Option<f32>,
}

impl LivenessSession {
    /// A session that starts at its first observed frame.
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            started_at_ms: None,
            debounce: Debounce::default(),
            detected: SignalSet::default(),
            blink_armed: false,
            prev_center: None,
            prev_area: None,
            prev_smile: None,
        }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.started_at_ms
    }

    pub fn detected(&self) -> SignalSet {
        self.detected
    }

    /// Clear all signals and trackers and start a new attempt at `now_ms`.
    pub fn reset(&mut self, now_ms: u64) {
        *self = Self::new(self.config.clone());
        self.started_at_ms = Some(now_ms);
        tracing::debug!(now_ms, "liveness session reset");
    }

    /// Evaluate one frame. `crop` feeds the texture check when present.
    pub fn step(&mut self, obs: &FaceObservation, crop: Option<&RgbImage>) -> LivenessVerdict {
        let now = obs.timestamp_ms;
        let started_at = *self.started_at_ms.get_or_insert(now);
        let cfg = &self.config;
        let mut fired = SignalSet::default();

        // Absent probabilities mean "not open" / "not smiling".
        let left_eye = obs.left_eye_open.unwrap_or(0.0);
        let right_eye = obs.right_eye_open.unwrap_or(0.0);
        let smile = obs.smile.unwrap_or(0.0);

        if left_eye > cfg.eyes_open_threshold && right_eye > cfg.eyes_open_threshold {
            self.blink_armed = true;
        }
        let eyes_closed =
            left_eye < cfg.eyes_closed_threshold && right_eye < cfg.eyes_closed_threshold;
        if eyes_closed
            && self.blink_armed
            && debounced(&mut self.debounce.blink, now, cfg.blink_debounce_ms)
        {
            self.blink_armed = false;
            fired.insert(Signal::Blink);
        }

        if smile > cfg.smile_threshold
            && debounced(&mut self.debounce.smile, now, cfg.smile_debounce_ms)
        {
            fired.insert(Signal::Smile);
        }

        // A delta needs two reported probabilities.
        if let (Some(prev), Some(cur)) = (self.prev_smile, obs.smile) {
            if (cur - prev).abs() > cfg.expression_delta {
                fired.insert(Signal::ExpressionChange);
            }
        }

        if obs.head_yaw_deg.abs() > cfg.head_turn_deg
            && debounced(&mut self.debounce.head_turn, now, cfg.head_turn_debounce_ms)
        {
            fired.insert(Signal::HeadTurn);
        }

        if obs.head_pitch_deg.abs() > cfg.head_nod_deg
            && debounced(&mut self.debounce.head_nod, now, cfg.head_nod_debounce_ms)
        {
            fired.insert(Signal::HeadNod);
        }

        let (cx, cy) = obs.bounding_box.center();
        if let Some((px, py)) = self.prev_center {
            if now.saturating_sub(started_at) >= cfg.movement_warmup_ms {
                let dx = cx - px;
                let dy = cy - py;
                if (dx * dx + dy * dy).sqrt() > cfg.movement_px {
                    fired.insert(Signal::Movement);
                }
            }
        }

        let area = obs.bounding_box.area();
        if let Some(prev) = self.prev_area.filter(|a| *a > 0.0) {
            if (area - prev).abs() / prev > cfg.size_change_ratio {
                fired.insert(Signal::SizeChange);
            }
        }

        let texture = crop.map(|c| texture::analyze(c, &cfg.texture));
        let texture_ok = texture.map(|t| t.plausible).unwrap_or(false);
        if texture_ok {
            fired.insert(Signal::Texture);
        }

        // Trackers always follow the latest frame.
        self.prev_center = Some((cx, cy));
        self.prev_area = Some(area);
        self.prev_smile = obs.smile;

        for signal in fired.iter().filter(|s| *s != Signal::Texture) {
            if !self.detected.contains(signal) {
                tracing::debug!(?signal, now_ms = now, "liveness signal detected");
            }
            self.detected.insert(signal);
        }

        let score = self.score(texture_ok);
        let is_live = score >= self.config.min_score
            && (!self.config.policy.requires_texture() || texture_ok);

        LivenessVerdict {
            is_live,
            score,
            detected: self.detected,
            fired,
            texture,
        }
    }

    /// Score of the sticky signals plus the current frame's texture result.
    pub fn score(&self, texture_ok: bool) -> u32 {
        let policy = self.config.policy;
        let sticky: u32 = self.detected.iter().map(|s| policy.weight(s)).sum();
        if texture_ok {
            sticky + policy.weight(Signal::Texture)
        } else {
            sticky
        }
    }
}

impl Default for LivenessSession {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::tests::{flat_crop, striped_crop};
    use crate::types::BoundingBox;

    fn face() -> BoundingBox {
        BoundingBox::new(100.0, 100.0, 100.0, 100.0)
    }

    fn obs(t: u64) -> FaceObservation {
        FaceObservation::at(t, face())
    }

    fn session() -> LivenessSession {
        let mut s = LivenessSession::default();
        s.reset(0);
        s
    }

    #[test]
    fn test_single_default_observation_scores_zero() {
        let mut s = session();
        let v = s.step(&obs(0), None);
        assert_eq!(v.score, 0);
        assert!(!v.is_live);
        assert!(v.detected.is_empty());
    }

    #[test]
    fn test_scripted_sequence_goes_live_on_fourth_frame() {
        let mut s = session();

        let v1 = s.step(&obs(0).with_eyes(0.9, 0.9), None);
        assert_eq!(v1.score, 0);
        assert!(!v1.is_live);

        let v2 = s.step(&obs(200).with_eyes(0.1, 0.1), None);
        assert!(v2.accepted(Signal::Blink));
        assert_eq!(v2.score, 1);
        assert!(!v2.is_live);

        let v3 = s.step(&obs(1800).with_smile(0.8), None);
        assert!(v3.accepted(Signal::Smile));
        assert_eq!(v3.score, 2);
        assert!(!v3.is_live);

        let v4 = s.step(&obs(3400).with_head(25.0, 0.0), None);
        assert!(v4.accepted(Signal::HeadTurn));
        assert_eq!(v4.score, 3);
        assert!(v4.is_live);
    }

    #[test]
    fn test_blink_debounce_window() {
        let mut s = session();
        s.step(&obs(0).with_eyes(0.9, 0.9), None);
        assert!(s.step(&obs(1000).with_eyes(0.1, 0.1), None).accepted(Signal::Blink));

        // Re-opened, closed again 500 ms after the first trigger.
        s.step(&obs(1200).with_eyes(0.9, 0.9), None);
        let early = s.step(&obs(1500).with_eyes(0.1, 0.1), None);
        assert!(!early.accepted(Signal::Blink));
        assert_eq!(early.score, 1);

        // 1100 ms after the first trigger the re-trigger is accepted.
        s.step(&obs(1800).with_eyes(0.9, 0.9), None);
        let late = s.step(&obs(2100).with_eyes(0.1, 0.1), None);
        assert!(late.accepted(Signal::Blink));
        assert_eq!(late.score, 1);
    }

    #[test]
    fn test_blink_requires_open_eyes_first() {
        let mut s = session();
        for t in [0, 1500, 3000] {
            let v = s.step(&obs(t).with_eyes(0.1, 0.1), None);
            assert!(!v.accepted(Signal::Blink));
        }
        assert!(!s.detected().contains(Signal::Blink));
    }

    #[test]
    fn test_one_closed_eye_is_not_a_blink() {
        let mut s = session();
        s.step(&obs(0).with_eyes(0.9, 0.9), None);
        let v = s.step(&obs(200).with_eyes(0.1, 0.8), None);
        assert!(!v.accepted(Signal::Blink));
    }

    #[test]
    fn test_smile_debounce() {
        let mut s = session();
        assert!(s.step(&obs(0).with_smile(0.8), None).accepted(Signal::Smile));
        assert!(!s.step(&obs(1000).with_smile(0.8), None).accepted(Signal::Smile));
        assert!(s.step(&obs(1600).with_smile(0.8), None).accepted(Signal::Smile));
        assert!(!s.step(&obs(1700).with_smile(0.7), None).accepted(Signal::Smile));
    }

    #[test]
    fn test_expression_change() {
        let mut s = session();
        s.step(&obs(0).with_smile(0.1), None);
        assert!(!s.step(&obs(100).with_smile(0.3), None).accepted(Signal::ExpressionChange));
        let v = s.step(&obs(200).with_smile(0.65), None);
        assert!(v.accepted(Signal::ExpressionChange));
        assert_eq!(v.score, 1);
    }

    #[test]
    fn test_expression_change_needs_reported_probabilities() {
        let mut s = session();
        s.step(&obs(0), None);
        let v = s.step(&obs(100).with_smile(0.6), None);
        assert!(!v.accepted(Signal::ExpressionChange));
        let v = s.step(&obs(200), None);
        assert!(!v.accepted(Signal::ExpressionChange));
    }

    #[test]
    fn test_head_turn_and_nod() {
        let mut s = session();
        let v = s.step(&obs(0).with_head(-25.0, 15.0), None);
        assert!(v.accepted(Signal::HeadTurn));
        assert!(!v.accepted(Signal::HeadNod));

        let v = s.step(&obs(100).with_head(0.0, -16.0), None);
        assert!(v.accepted(Signal::HeadNod));
        assert_eq!(v.score, 2);

        // Both inside their 1500 ms windows.
        let v = s.step(&obs(1500).with_head(30.0, 30.0), None);
        assert!(!v.accepted(Signal::HeadTurn));
        assert!(!v.accepted(Signal::HeadNod));
        let v = s.step(&obs(1700).with_head(30.0, 30.0), None);
        assert!(v.accepted(Signal::HeadTurn));
        assert!(v.accepted(Signal::HeadNod));
    }

    #[test]
    fn test_movement_waits_for_warmup() {
        let mut s = session();
        s.step(&obs(0), None);

        let shifted = BoundingBox::new(130.0, 100.0, 100.0, 100.0);
        let v = s.step(&FaceObservation::at(500, shifted), None);
        assert!(!v.accepted(Signal::Movement));

        let shifted_again = BoundingBox::new(160.0, 100.0, 100.0, 100.0);
        let v = s.step(&FaceObservation::at(1500, shifted_again), None);
        assert!(v.accepted(Signal::Movement));
    }

    #[test]
    fn test_movement_warmup_boundary_is_inclusive() {
        let mut s = session();
        s.step(&obs(0), None);
        let shifted = BoundingBox::new(140.0, 100.0, 100.0, 100.0);
        let v = s.step(&FaceObservation::at(999, shifted), None);
        assert!(!v.accepted(Signal::Movement));

        let mut s = session();
        s.step(&obs(0), None);
        let v = s.step(&FaceObservation::at(1000, shifted), None);
        assert!(v.accepted(Signal::Movement));
    }

    #[test]
    fn test_slow_drift_never_moves() {
        let mut s = session();
        for (i, t) in [2000, 2100, 2200, 2300].into_iter().enumerate() {
            let x = 100.0 + 15.0 * i as f32;
            let bbox = BoundingBox::new(x, 100.0, 100.0, 100.0);
            let v = s.step(&FaceObservation::at(t, bbox), None);
            assert!(!v.accepted(Signal::Movement), "fired at t={t}");
        }
        assert!(!s.detected().contains(Signal::Movement));
    }

    #[test]
    fn test_gradual_growth_never_resizes() {
        let mut s = session();
        let mut height = 100.0f32;
        for t in [0, 100, 200, 300] {
            let bbox = BoundingBox::new(100.0, 100.0, 100.0, height);
            let v = s.step(&FaceObservation::at(t, bbox), None);
            assert!(!v.accepted(Signal::SizeChange), "fired at t={t}");
            height *= 1.15;
        }
        assert!(!s.detected().contains(Signal::SizeChange));
    }

    #[test]
    fn test_gradual_smile_never_changes_expression() {
        let mut s = session();
        for (t, smile) in [(0, 0.0), (100, 0.2), (200, 0.4), (300, 0.6)] {
            let v = s.step(&obs(t).with_smile(smile), None);
            assert!(!v.accepted(Signal::ExpressionChange), "fired at t={t}");
        }
        assert!(s.detected().is_empty());
    }

    #[test]
    fn test_small_movement_ignored() {
        let mut s = session();
        s.step(&obs(2000), None);
        let nudged = BoundingBox::new(110.0, 110.0, 100.0, 100.0);
        let v = s.step(&FaceObservation::at(2100, nudged), None);
        assert!(!v.accepted(Signal::Movement));
    }

    #[test]
    fn test_first_observation_never_moves_or_resizes() {
        let mut s = session();
        let far = BoundingBox::new(900.0, 900.0, 300.0, 300.0);
        let v = s.step(&FaceObservation::at(5000, far), None);
        assert!(!v.accepted(Signal::Movement));
        assert!(!v.accepted(Signal::SizeChange));
    }

    #[test]
    fn test_size_change() {
        let mut s = session();
        s.step(&obs(0), None);
        let slightly = BoundingBox::new(100.0, 100.0, 100.0, 110.0);
        assert!(!s
            .step(&FaceObservation::at(100, slightly), None)
            .accepted(Signal::SizeChange));
        let closer = BoundingBox::new(100.0, 100.0, 100.0, 140.0);
        assert!(s
            .step(&FaceObservation::at(200, closer), None)
            .accepted(Signal::SizeChange));
    }

    #[test]
    fn test_session_starts_at_first_frame_without_reset() {
        let mut s = LivenessSession::default();
        s.step(&obs(10_000), None);
        assert_eq!(s.started_at_ms(), Some(10_000));

        let shifted = BoundingBox::new(150.0, 100.0, 100.0, 100.0);
        let v = s.step(&FaceObservation::at(10_500, shifted), None);
        assert!(!v.accepted(Signal::Movement));
    }

    #[test]
    fn test_reset_clears_sticky_state() {
        let mut s = session();
        s.step(&obs(0).with_eyes(0.9, 0.9), None);
        s.step(&obs(200).with_eyes(0.1, 0.1), None);
        s.step(&obs(300).with_smile(0.9), None);
        s.step(&obs(400).with_head(40.0, 0.0), None);
        assert_eq!(s.score(false), 3);

        s.reset(10_000);
        assert!(s.detected().is_empty());
        let v = s.step(&obs(10_000), None);
        assert_eq!(v.score, 0);
        assert!(!v.is_live);
    }

    #[test]
    fn test_behavioral_ignores_texture() {
        let mut s = session();
        let crop = striped_crop();
        let v = s.step(&obs(0), Some(&crop));
        assert!(v.texture.unwrap().plausible);
        assert!(v.accepted(Signal::Texture));
        assert_eq!(v.score, 0);
        assert!(!v.is_live);
    }

    fn gated() -> LivenessSession {
        let mut s = LivenessSession::new(LivenessConfig {
            policy: LivenessPolicy::TextureGated,
            ..LivenessConfig::default()
        });
        s.reset(0);
        s
    }

    #[test]
    fn test_texture_gate_blocks_flat_crop() {
        let mut s = gated();
        let flat = flat_crop(120);
        s.step(&obs(0).with_eyes(0.9, 0.9), Some(&flat));
        let v = s.step(&obs(200).with_eyes(0.1, 0.1).with_smile(0.9), Some(&flat));
        // blink 2 + smile 1
        assert_eq!(v.score, 3);
        assert!(!v.is_live);
    }

    #[test]
    fn test_texture_gate_weights() {
        let mut s = gated();
        let crop = striped_crop();
        let v = s.step(&obs(0).with_eyes(0.9, 0.9), Some(&crop));
        assert_eq!(v.score, 3);
        assert!(v.is_live);

        let v = s.step(&obs(200).with_eyes(0.1, 0.1), Some(&crop));
        assert_eq!(v.score, 5);

        // Head turn carries no weight under this policy.
        let v = s.step(&obs(400).with_head(30.0, 0.0), Some(&crop));
        assert_eq!(v.score, 5);
        assert!(s.detected().contains(Signal::HeadTurn));
    }

    #[test]
    fn test_texture_gate_without_crop_is_not_live() {
        let mut s = gated();
        s.step(&obs(0).with_eyes(0.9, 0.9), None);
        let v = s.step(&obs(200).with_eyes(0.1, 0.1).with_smile(0.9), None);
        assert_eq!(v.score, 3);
        assert!(v.texture.is_none());
        assert!(!v.is_live);
    }

    #[test]
    fn test_texture_is_not_sticky() {
        let mut s = gated();
        let crop = striped_crop();
        assert!(s.step(&obs(0), Some(&crop)).is_live);
        let v = s.step(&obs(100), Some(&flat_crop(10)));
        assert_eq!(v.score, 0);
        assert!(!v.is_live);
    }

    #[test]
    fn test_policy_max_scores() {
        assert_eq!(LivenessPolicy::Behavioral.max_score(), 7);
        assert_eq!(LivenessPolicy::TextureGated.max_score(), 7);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "texture-gated".parse::<LivenessPolicy>().unwrap(),
            LivenessPolicy::TextureGated
        );
        assert_eq!(
            "Behavioral".parse::<LivenessPolicy>().unwrap(),
            LivenessPolicy::Behavioral
        );
        assert!("strict".parse::<LivenessPolicy>().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let cfg: LivenessConfig =
            serde_json::from_str(r#"{"policy":"texture_gated","blink_debounce_ms":800}"#).unwrap();
        assert_eq!(cfg.policy, LivenessPolicy::TextureGated);
        assert_eq!(cfg.blink_debounce_ms, 800);
        assert_eq!(cfg.smile_debounce_ms, 1500);
        assert_eq!(cfg.texture.max_variance, 5000.0);
    }

    #[test]
    fn test_signal_set_serializes_as_list() {
        let mut set = SignalSet::default();
        set.insert(Signal::HeadNod);
        set.insert(Signal::Blink);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["blink","head_nod"]"#);
    }
}
