//! Archive entry names for voice files

use assetpack_errors::{Error, PackageError};

/// Name the model card keeps inside the archive
pub const MODEL_CARD: &str = "MODEL_CARD";
pub const VOICE_MODEL: &str = "voice.onnx";
pub const VOICE_CONFIG: &str = "voice.json";

/// How a downloaded voice file is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceFile {
    ModelCard,
    Model,
    Config,
    /// No known role; carries the file's extension (possibly empty)
    Unknown { file: String, extension: String },
}

impl VoiceFile {
    /// Classify a voice file by the last path segment of its URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or has no file name.
    pub fn from_url(raw: &str) -> Result<Self, Error> {
        let file = file_name(raw)?;
        Ok(Self::from_file_name(&file))
    }

    #[must_use]
    pub fn from_file_name(file: &str) -> Self {
        if file == MODEL_CARD {
            return Self::ModelCard;
        }
        let extension = file
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{ext}"))
            .unwrap_or_default();
        match extension.as_str() {
            ".onnx" => Self::Model,
            ".json" => Self::Config,
            _ => Self::Unknown {
                file: file.to_string(),
                extension,
            },
        }
    }

    /// Entry name inside `dist.tzst`, if the file has a known role
    #[must_use]
    pub fn entry_name(&self) -> Option<&'static str> {
        match self {
            Self::ModelCard => Some(MODEL_CARD),
            Self::Model => Some(VOICE_MODEL),
            Self::Config => Some(VOICE_CONFIG),
            Self::Unknown { .. } => None,
        }
    }
}

/// Last non-empty path segment of a URL, percent-decoding left as is
///
/// # Errors
///
/// Returns [`PackageError::InvalidSource`] if there is no such segment.
pub fn file_name(raw: &str) -> Result<String, Error> {
    let parsed = url::Url::parse(raw).map_err(|e| PackageError::InvalidSource {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| {
            PackageError::InvalidSource {
                url: raw.to_string(),
                message: "URL has no file name".to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://huggingface.co/rhasspy/piper-voices/resolve/v1.0.0/en/en_GB/alan/medium";

    #[test]
    fn test_voice_files_are_renamed() {
        let onnx = VoiceFile::from_url(&format!("{BASE}/en_GB-alan-medium.onnx")).unwrap();
        assert_eq!(onnx.entry_name(), Some("voice.onnx"));

        let json = VoiceFile::from_url(&format!("{BASE}/en_GB-alan-medium.onnx.json")).unwrap();
        assert_eq!(json.entry_name(), Some("voice.json"));

        let card = VoiceFile::from_url(&format!("{BASE}/MODEL_CARD")).unwrap();
        assert_eq!(card, VoiceFile::ModelCard);
        assert_eq!(card.entry_name(), Some("MODEL_CARD"));
    }

    #[test]
    fn test_unknown_extension_is_reported() {
        let file = VoiceFile::from_url(&format!("{BASE}/samples.wav")).unwrap();
        assert_eq!(
            file,
            VoiceFile::Unknown {
                file: "samples.wav".to_string(),
                extension: ".wav".to_string()
            }
        );
        assert_eq!(file.entry_name(), None);

        let bare = VoiceFile::from_file_name("LICENSE");
        assert!(matches!(bare, VoiceFile::Unknown { ref extension, .. } if extension.is_empty()));
    }

    #[test]
    fn test_file_name_requires_segment() {
        assert_eq!(
            file_name("https://example.com/a/b.onnx?download=true").unwrap(),
            "b.onnx"
        );
        assert_eq!(file_name("https://example.com/dir/").unwrap(), "dir");
        assert!(file_name("https://example.com/").is_err());
        assert!(file_name("nope").is_err());
    }
}
