use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const SAMPLE_RATE: u32 = 16000; // whisper requires 16kHz
pub const METADATA_DELIMITER: u8 = b'\n';
const PCM_SCALE: f32 = 32768.0; // i16 -> [-1.0, 1.0)

macro_rules! languages {
    ($($variant:ident => $code:literal, $name:literal;)*) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize,
        )]
        pub enum Language {
            $(#[serde(rename = $code)] $variant,)*
        }

        impl Language {
            pub const ALL: &'static [Language] = &[$(Language::$variant),*];

            pub fn code(self) -> &'static str {
                match self {
                    $(Language::$variant => $code,)*
                }
            }

            /// Lowercase English name, the form whisper takes for `language`.
            pub fn name(self) -> &'static str {
                match self {
                    $(Language::$variant => $name,)*
                }
            }

            pub fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some(Language::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

languages! {
    English => "en", "english";
    Spanish => "es", "spanish";
    French => "fr", "french";
    German => "de", "german";
    Italian => "it", "italian";
    Portuguese => "pt", "portuguese";
    Russian => "ru", "russian";
    Chinese => "zh", "chinese";
    Japanese => "ja", "japanese";
    Arabic => "ar", "arabic";
    Hindi => "hi", "hindi";
    Dutch => "nl", "dutch";
    Polish => "pl", "polish";
    Turkish => "tr", "turkish";
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language code {0:?}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_code(s).ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Installed translation directions, keyed by source language.
///
/// Every supported source language is present as a key, possibly with an
/// empty target list. Targets are kept sorted and unique so two catalogs
/// with the same content serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguagePairs(BTreeMap<Language, Vec<Language>>);

impl LanguagePairs {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Language, Language)>,
    {
        let mut map: BTreeMap<Language, Vec<Language>> =
            Language::ALL.iter().map(|&l| (l, Vec::new())).collect();
        for (from, to) in pairs {
            if from == to {
                continue; // identity needs no package
            }
            map.entry(from).or_default().push(to);
        }
        for targets in map.values_mut() {
            targets.sort();
            targets.dedup();
        }
        Self(map)
    }

    pub fn targets(&self, from: Language) -> &[Language] {
        self.0.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, from: Language, to: Language) -> bool {
        self.targets(from).contains(&to)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Language, &[Language])> {
        self.0.iter().map(|(&from, to)| (from, to.as_slice()))
    }

    pub fn pair_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl Default for LanguagePairs {
    fn default() -> Self {
        Self::from_pairs(std::iter::empty())
    }
}

/// JSON header of an inbound audio frame. Unknown keys are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub from_code: Language,
    pub to_code: Language,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame has no metadata delimiter")]
    MissingDelimiter,
    #[error("invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("frame carries no audio")]
    EmptyAudio,
    #[error("audio segment of {0} bytes is not a whole number of 16-bit samples")]
    OddAudioLength(usize),
}

/// One client frame: `<metadata json>\n<i16 LE pcm>`.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub metadata: FrameMetadata,
    pub audio: &'a [u8],
}

impl<'a> AudioFrame<'a> {
    /// Splits at the first delimiter; the audio may itself contain `0x0A`.
    pub fn parse(frame: &'a [u8]) -> Result<Self, FrameError> {
        let split = frame
            .iter()
            .position(|&b| b == METADATA_DELIMITER)
            .ok_or(FrameError::MissingDelimiter)?;
        let metadata = serde_json::from_slice(&frame[..split])?;
        Ok(Self {
            metadata,
            audio: &frame[split + 1..],
        })
    }

    pub fn samples(&self) -> Result<Vec<f32>, FrameError> {
        decode_pcm(self.audio)
    }

    pub fn encode(metadata: &FrameMetadata, pcm: &[i16]) -> Vec<u8> {
        // serializing two enum fields cannot fail
        let header = serde_json::to_vec(metadata).unwrap_or_default();
        let mut frame = Vec::with_capacity(header.len() + 1 + pcm.len() * 2);
        frame.extend_from_slice(&header);
        frame.push(METADATA_DELIMITER);
        for sample in pcm {
            frame.extend_from_slice(&sample.to_le_bytes());
        }
        frame
    }
}

pub fn decode_pcm(bytes: &[u8]) -> Result<Vec<f32>, FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::EmptyAudio);
    }
    if bytes.len() % 2 != 0 {
        return Err(FrameError::OddAudioLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / PCM_SCALE)
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    LanguagePairs {
        data: LanguagePairs, // sent once, right after connect
    },
    Result {
        transcription: String,
        translation: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(from: Language, to: Language) -> FrameMetadata {
        FrameMetadata {
            from_code: from,
            to_code: to,
        }
    }

    #[test]
    fn language_codes_are_unique_and_parse_back() {
        assert_eq!(Language::ALL.len(), 14);
        for &lang in Language::ALL {
            assert_eq!(lang.code().len(), 2);
            assert_eq!(Language::from_code(lang.code()), Some(lang));
            assert_eq!(lang.code().parse::<Language>(), Ok(lang));
        }
        assert!("xx".parse::<Language>().is_err());
        assert_eq!(Language::Chinese.name(), "chinese");
    }

    #[test]
    fn parse_splits_at_first_delimiter() {
        let mut frame = br#"{"from_code":"en","to_code":"es","extra":1}"#.to_vec();
        frame.push(b'\n');
        frame.extend_from_slice(&[0x0A, 0x00, 0xFF, 0x7F]);

        let parsed = AudioFrame::parse(&frame).unwrap();
        assert_eq!(parsed.metadata, meta(Language::English, Language::Spanish));
        assert_eq!(parsed.audio, &[0x0A, 0x00, 0xFF, 0x7F]);

        let samples = parsed.samples().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], 10.0 / 32768.0);
        assert_eq!(samples[1], 32767.0 / 32768.0);
    }

    #[test]
    fn parse_rejects_missing_delimiter() {
        let err = AudioFrame::parse(br#"{"from_code":"en","to_code":"es"}"#).unwrap_err();
        assert!(matches!(err, FrameError::MissingDelimiter));
    }

    #[test]
    fn parse_rejects_bad_metadata() {
        let err = AudioFrame::parse(b"not json\n\x00\x00").unwrap_err();
        assert!(matches!(err, FrameError::Metadata(_)));

        let err = AudioFrame::parse(b"{\"from_code\":\"en\"}\n\x00\x00").unwrap_err();
        assert!(err.to_string().contains("to_code"));

        let err =
            AudioFrame::parse(b"{\"from_code\":\"xx\",\"to_code\":\"en\"}\n\x00\x00").unwrap_err();
        assert!(matches!(err, FrameError::Metadata(_)));
    }

    #[test]
    fn decode_pcm_checks_length() {
        assert!(matches!(decode_pcm(&[]), Err(FrameError::EmptyAudio)));
        assert!(matches!(
            decode_pcm(&[1, 2, 3]),
            Err(FrameError::OddAudioLength(3))
        ));
        let samples = decode_pcm(&i16::MIN.to_le_bytes()).unwrap();
        assert_eq!(samples, vec![-1.0]);
    }

    #[test]
    fn encode_produces_parseable_frame() {
        let m = meta(Language::German, Language::French);
        let frame = AudioFrame::encode(&m, &[0, -16384, 16384]);
        let parsed = AudioFrame::parse(&frame).unwrap();
        assert_eq!(parsed.metadata, m);
        assert_eq!(parsed.samples().unwrap(), vec![0.0, -0.5, 0.5]);
    }

    #[test]
    fn language_pairs_cover_every_source() {
        let pairs = LanguagePairs::from_pairs([
            (Language::English, Language::Spanish),
            (Language::English, Language::French),
            (Language::English, Language::Spanish),
            (Language::English, Language::English),
        ]);
        assert_eq!(pairs.iter().count(), Language::ALL.len());
        assert_eq!(
            pairs.targets(Language::English),
            &[Language::Spanish, Language::French]
        );
        assert!(pairs.targets(Language::Turkish).is_empty());
        assert_eq!(pairs.pair_count(), 2);
        assert!(pairs.contains(Language::English, Language::French));
        assert!(!pairs.contains(Language::French, Language::English));
    }

    #[test]
    fn server_messages_match_wire_format() {
        let pairs = LanguagePairs::from_pairs([(Language::English, Language::Spanish)]);
        let json = ServerMessage::LanguagePairs { data: pairs }.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "language_pairs");
        assert_eq!(value["data"]["en"], serde_json::json!(["es"]));
        assert_eq!(value["data"]["tr"], serde_json::json!([]));

        let json = ServerMessage::Result {
            transcription: "hello".into(),
            translation: "hola".into(),
        }
        .to_json()
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"result","transcription":"hello","translation":"hola"}"#
        );

        let json = ServerMessage::error("boom").to_json().unwrap();
        assert_eq!(json, r#"{"type":"error","message":"boom"}"#);
    }
}
