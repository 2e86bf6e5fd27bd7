//! Asset manifest: which voices and binaries get packaged

use assetpack_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// A voice model package assembled from individually downloaded files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAsset {
    pub name: String,
    pub version: String,
    pub urls: Vec<String>,
}

/// A binary package re-extracted from a third-party distribution archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryAsset {
    pub name: String,
    pub version: String,
    pub url: String,
    /// Top-level directory to keep; it is stripped from entry names
    #[serde(default)]
    pub root: Option<String>,
}

/// Everything one invocation packages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub voice: Vec<VoiceAsset>,
    #[serde(default)]
    pub binary: Vec<BinaryAsset>,
}

impl AssetManifest {
    /// Load and validate a manifest file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if it fails
    /// validation.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;
        Self::from_toml(&contents, &path.display().to_string())
    }

    /// Parse and validate a manifest from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml(contents: &str, origin: &str) -> Result<Self, Error> {
        let manifest: Self = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check names, URLs and roots
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for voice in &self.voice {
            check_name("voice", &voice.name, &mut seen)?;
            if voice.urls.is_empty() {
                return Err(ConfigError::MissingField {
                    field: format!("voice.{}.urls", voice.name),
                }
                .into());
            }
            for url in &voice.urls {
                check_url(&voice.name, url)?;
            }
        }

        seen.clear();
        for binary in &self.binary {
            check_name("binary", &binary.name, &mut seen)?;
            check_url(&binary.name, &binary.url)?;
            if let Some(root) = &binary.root {
                if root.trim_matches('/').is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("binary.{}.root", binary.name),
                        value: root.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Keep only the assets whose name is listed
    #[must_use]
    pub fn filtered(mut self, names: &[String]) -> Self {
        if names.is_empty() {
            return self;
        }
        self.voice.retain(|v| names.contains(&v.name));
        self.binary.retain(|b| names.contains(&b.name));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voice.is_empty() && self.binary.is_empty()
    }
}

fn check_name<'a>(kind: &str, name: &'a str, seen: &mut HashSet<&'a str>) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ConfigError::InvalidValue {
            field: format!("{kind}.name"),
            value: name.to_string(),
        }
        .into());
    }
    if !seen.insert(name) {
        return Err(ConfigError::Invalid {
            message: format!("duplicate {kind} name {name:?}"),
        }
        .into());
    }
    Ok(())
}

fn check_url(asset: &str, raw: &str) -> Result<(), Error> {
    url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        field: format!("{asset}.url"),
        value: format!("{raw} ({e})"),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[voice]]
name = "jenny"
version = "1.0.0"
urls = [
    "https://example.com/voices/en_GB-jenny_dioco-medium.onnx",
    "https://example.com/voices/en_GB-jenny_dioco-medium.onnx.json",
    "https://example.com/voices/MODEL_CARD",
]

[[binary]]
name = "linux"
version = "v2.0.0"
url = "https://example.com/releases/piper_linux_x86_64.tar.gz"
root = "piper"
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = AssetManifest::from_toml(SAMPLE, "sample").unwrap();
        assert_eq!(manifest.voice.len(), 1);
        assert_eq!(manifest.voice[0].urls.len(), 3);
        assert_eq!(manifest.binary[0].root.as_deref(), Some("piper"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"
[[binary]]
name = "linux"
version = "1"
url = "https://example.com/a.tar.gz"

[[binary]]
name = "linux"
version = "1"
url = "https://example.com/b.tar.gz"
"#;
        assert!(AssetManifest::from_toml(text, "dup").is_err());
    }

    #[test]
    fn test_voice_without_urls_rejected() {
        let text = r#"
[[voice]]
name = "alan"
version = "1.0.0"
urls = []
"#;
        assert!(AssetManifest::from_toml(text, "empty").is_err());
    }

    #[test]
    fn test_bad_url_rejected() {
        let text = r#"
[[binary]]
name = "linux"
version = "1"
url = "not a url"
"#;
        assert!(AssetManifest::from_toml(text, "bad").is_err());
    }

    #[test]
    fn test_filtered() {
        let manifest = AssetManifest::from_toml(SAMPLE, "sample").unwrap();
        let only_linux = manifest.clone().filtered(&["linux".to_string()]);
        assert!(only_linux.voice.is_empty());
        assert_eq!(only_linux.binary.len(), 1);
        assert_eq!(manifest.clone().filtered(&[]), manifest);
    }
}
