//! Voice effects: text rewrites that make a plain engine sound different.
//!
//! Effects work on the text handed to the engine, not on audio samples, so
//! they behave the same with every [`SpeechEngine`](crate::engine::SpeechEngine).

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Effect applied to each chunk before it is spoken or synthesised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceEffect {
    #[default]
    None,
    Echo,
    Whisper,
    Robot,
    SlowMotion,
}

impl VoiceEffect {
    pub const ALL: [VoiceEffect; 5] = [
        VoiceEffect::None,
        VoiceEffect::Echo,
        VoiceEffect::Whisper,
        VoiceEffect::Robot,
        VoiceEffect::SlowMotion,
    ];

    /// Rewrite `text` for this effect.
    pub fn apply(self, text: &str) -> String {
        match self {
            VoiceEffect::None => text.to_string(),
            VoiceEffect::Echo => text
                .split_whitespace()
                .map(|w| format!("{w} {w}"))
                .collect::<Vec<_>>()
                .join(" ... "),
            VoiceEffect::Whisper => format!("(whispering) {}", text.to_lowercase()),
            VoiceEffect::Robot => text
                .split_whitespace()
                .map(str::to_uppercase)
                .collect::<Vec<_>>()
                .join(" "),
            VoiceEffect::SlowMotion => text.split_whitespace().collect::<Vec<_>>().join(" ... "),
        }
    }

    /// Sentence spoken by the preview action.
    pub fn preview_text(self) -> &'static str {
        match self {
            VoiceEffect::None => "This is a preview of the current voice settings.",
            VoiceEffect::Echo => "Echo... echo... echo effect...",
            VoiceEffect::Whisper => "This is a whisper effect preview...",
            VoiceEffect::Robot => "I. AM. A. ROBOT. VOICE. EFFECT.",
            VoiceEffect::SlowMotion => "This... is... a... slow... motion... preview...",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            VoiceEffect::None => "None",
            VoiceEffect::Echo => "Echo",
            VoiceEffect::Whisper => "Whisper",
            VoiceEffect::Robot => "Robot",
            VoiceEffect::SlowMotion => "Slow Motion",
        }
    }
}

impl fmt::Display for VoiceEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VoiceEffect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "" | "none" => Ok(VoiceEffect::None),
            "echo" => Ok(VoiceEffect::Echo),
            "whisper" => Ok(VoiceEffect::Whisper),
            "robot" => Ok(VoiceEffect::Robot),
            "slowmotion" => Ok(VoiceEffect::SlowMotion),
            _ => Err(format!(
                "unknown effect {s:?} (expected none, echo, whisper, robot or slow-motion)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_doubles_words() {
        assert_eq!(VoiceEffect::Echo.apply("hello big world"), "hello hello ... big big ... world world");
    }

    #[test]
    fn test_whisper_lowercases() {
        assert_eq!(VoiceEffect::Whisper.apply("Quiet NOW"), "(whispering) quiet now");
    }

    #[test]
    fn test_robot_uppercases_and_collapses_whitespace() {
        assert_eq!(VoiceEffect::Robot.apply("i am\n  a robot"), "I AM A ROBOT");
    }

    #[test]
    fn test_slow_motion_inserts_ellipses() {
        assert_eq!(VoiceEffect::SlowMotion.apply("one two three"), "one ... two ... three");
    }

    #[test]
    fn test_none_is_identity() {
        let text = "  Keep\n\nthis exactly ";
        assert_eq!(VoiceEffect::None.apply(text), text);
    }

    #[test]
    fn test_parse_labels_and_keys() {
        assert_eq!("Slow Motion".parse::<VoiceEffect>().unwrap(), VoiceEffect::SlowMotion);
        assert_eq!("slow-motion".parse::<VoiceEffect>().unwrap(), VoiceEffect::SlowMotion);
        assert_eq!("ROBOT".parse::<VoiceEffect>().unwrap(), VoiceEffect::Robot);
        assert_eq!("none".parse::<VoiceEffect>().unwrap(), VoiceEffect::None);
        assert!("reverb".parse::<VoiceEffect>().is_err());
    }

    #[test]
    fn test_label_round_trips_through_parse() {
        for effect in VoiceEffect::ALL {
            assert_eq!(effect.label().parse::<VoiceEffect>().unwrap(), effect);
        }
    }

    #[test]
    fn test_every_effect_has_a_preview() {
        for effect in VoiceEffect::ALL {
            assert!(!effect.preview_text().is_empty());
        }
    }
}
