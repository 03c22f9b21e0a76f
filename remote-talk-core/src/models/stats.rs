use serde::{Deserialize, Serialize};

/// Voice parameters for one synthesis request.
///
/// Every voice field is optional: only fields that are set are applied to
/// the engine, the rest keep whatever the engine currently uses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TalkParams {
    /// Silence the host's own playback while the request is synthesized.
    pub mute: bool,
    /// Downmix captured audio to a single channel before streaming.
    pub force_mono: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intonation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joy: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anger: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorrow: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast: Option<i32>,
}

impl TalkParams {
    /// Copy every field that is set in `update` onto `self`.
    pub fn apply(&mut self, update: &TalkParams) {
        self.mute = update.mute;
        self.force_mono = update.force_mono;

        fn set<T: Copy>(field: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *field = value;
            }
        }
        set(&mut self.volume, update.volume);
        set(&mut self.speed, update.speed);
        set(&mut self.pitch, update.pitch);
        set(&mut self.intonation, update.intonation);
        set(&mut self.joy, update.joy);
        set(&mut self.anger, update.anger);
        set(&mut self.sorrow, update.sorrow);
        set(&mut self.cast, update.cast);
    }

    /// Whether any voice field (not counting the flags) is set.
    pub fn has_voice_fields(&self) -> bool {
        self.volume.is_some()
            || self.speed.is_some()
            || self.pitch.is_some()
            || self.intonation.is_some()
            || self.joy.is_some()
            || self.anger.is_some()
            || self.sorrow.is_some()
            || self.cast.is_some()
    }
}

/// One voice available in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastInfo {
    pub id: i32,
    pub name: String,
}

/// Snapshot of the engine, returned by the stats operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TalkStats {
    pub params: TalkParams,
    pub casts: Vec<CastInfo>,
    pub host: String,
    pub plugin_version: String,
    pub protocol_version: String,
}

impl TalkStats {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
