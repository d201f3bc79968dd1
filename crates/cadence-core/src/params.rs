use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ParameterError;

/// Generation backend on the worker side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Huggingface,
    Magenta,
    Simple,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MusicStyle {
    Classical,
    Jazz,
    Pop,
    Ambient,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MusicKey {
    #[serde(rename = "C major")]
    CMajor,
    #[serde(rename = "D major")]
    DMajor,
    #[serde(rename = "G major")]
    GMajor,
    #[serde(rename = "A minor")]
    AMinor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    Happy,
    Melancholic,
    Dreamy,
    Intense,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationBucket {
    #[serde(rename = "30 sec")]
    ThirtySeconds,
    #[serde(rename = "1 min")]
    OneMinute,
    #[serde(rename = "2 min")]
    TwoMinutes,
}

impl DurationBucket {
    pub fn seconds(self) -> u32 {
        match self {
            Self::ThirtySeconds => 30,
            Self::OneMinute => 60,
            Self::TwoMinutes => 120,
        }
    }
}

/// Tempo in BPM, always within [`Tempo::MIN`]..=[`Tempo::MAX`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Tempo(u16);

impl Tempo {
    pub const MIN: u16 = 40;
    pub const MAX: u16 = 180;
    pub const DEFAULT: Tempo = Tempo(100);

    pub fn new(bpm: u16) -> Result<Self, ParameterError> {
        if (Self::MIN..=Self::MAX).contains(&bpm) {
            Ok(Self(bpm))
        } else {
            Err(ParameterError::TempoOutOfRange(bpm))
        }
    }

    pub fn bpm(self) -> u16 {
        self.0
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u16> for Tempo {
    type Error = ParameterError;
    fn try_from(bpm: u16) -> Result<Self, Self::Error> {
        Self::new(bpm)
    }
}

impl From<Tempo> for u16 {
    fn from(tempo: Tempo) -> Self {
        tempo.0
    }
}

/// Everything the worker needs to run one generation task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub backend: Backend,
    pub style: MusicStyle,
    pub key: MusicKey,
    pub tempo: Tempo,
    pub mood: Mood,
    pub duration: DurationBucket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl GenerationParameters {
    pub fn validate(&self) -> Result<(), ParameterError> {
        let _ = Tempo::new(self.tempo.bpm())?;
        if self.prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ParameterError::EmptyPrompt);
        }
        Ok(())
    }
}

// Display/FromStr use the wire spelling so CLI flags and JSON agree.
macro_rules! wire_str {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = serde_json::to_value(self)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_else(|| format!("{self:?}"));
                f.write_str(&s)
            }
        }

        impl FromStr for $ty {
            type Err = ParameterError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                serde_json::from_value(serde_json::Value::String(s.to_owned())).map_err(|_| {
                    ParameterError::UnknownVariant {
                        kind: stringify!($ty),
                        value: s.to_owned(),
                    }
                })
            }
        }
    };
}

wire_str!(Backend);
wire_str!(MusicStyle);
wire_str!(MusicKey);
wire_str!(Mood);
wire_str!(DurationBucket);

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn sample() -> GenerationParameters {
        GenerationParameters {
            backend: Backend::Simple,
            style: MusicStyle::Jazz,
            key: MusicKey::AMinor,
            tempo: Tempo::new(120).unwrap(),
            mood: Mood::Dreamy,
            duration: DurationBucket::OneMinute,
            prompt: None,
        }
    }

    #[test]
    fn serializes_with_wire_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "backend": "simple",
                "style": "Jazz",
                "key": "A minor",
                "tempo": 120,
                "mood": "Dreamy",
                "duration": "1 min"
            })
        );
    }

    #[test]
    fn tempo_bounds() {
        assert!(Tempo::new(40).is_ok());
        assert!(Tempo::new(180).is_ok());
        assert_matches!(Tempo::new(39), Err(ParameterError::TempoOutOfRange(39)));
        assert_matches!(Tempo::new(181), Err(ParameterError::TempoOutOfRange(181)));
    }

    #[test]
    fn deserialize_rejects_out_of_range_tempo() {
        let raw = json!({
            "backend": "magenta",
            "style": "Pop",
            "key": "C major",
            "tempo": 200,
            "mood": "Happy",
            "duration": "30 sec"
        });
        assert!(serde_json::from_value::<GenerationParameters>(raw).is_err());
    }

    #[test]
    fn empty_prompt_is_invalid() {
        let mut params = sample();
        params.prompt = Some("   ".into());
        assert_matches!(params.validate(), Err(ParameterError::EmptyPrompt));
        params.prompt = Some("slow rainy piano".into());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn from_str_uses_wire_spelling() {
        assert_eq!("G major".parse::<MusicKey>().unwrap(), MusicKey::GMajor);
        assert_eq!("huggingface".parse::<Backend>().unwrap(), Backend::Huggingface);
        assert_eq!(DurationBucket::TwoMinutes.to_string(), "2 min");
        assert_matches!(
            "Polka".parse::<MusicStyle>(),
            Err(ParameterError::UnknownVariant { kind: "MusicStyle", .. })
        );
    }

    #[test]
    fn duration_seconds() {
        assert_eq!(DurationBucket::ThirtySeconds.seconds(), 30);
        assert_eq!(DurationBucket::OneMinute.seconds(), 60);
        assert_eq!(DurationBucket::TwoMinutes.seconds(), 120);
    }
}
