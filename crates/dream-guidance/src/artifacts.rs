//! Pretrained artifact identifiers and the optional local access token.

use std::fs;
use std::io;
use std::path::Path;

/// Identifiers of the four pretrained artifacts the engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub autoencoder: String,
    pub tokenizer: String,
    pub text_encoder: String,
    pub noise_predictor: String,
}

impl ArtifactSet {
    /// Stable Diffusion 1.5 with the CLIP ViT-L/14 text stack.
    pub fn sd15() -> Self {
        Self {
            autoencoder: "runwayml/stable-diffusion-v1-5/vae".into(),
            tokenizer: "openai/clip-vit-large-patch14".into(),
            text_encoder: "openai/clip-vit-large-patch14".into(),
            noise_predictor: "runwayml/stable-diffusion-v1-5/unet".into(),
        }
    }
}

impl Default for ArtifactSet {
    fn default() -> Self {
        Self::sd15()
    }
}

/// Hub credential used when fetching gated weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessToken {
    /// Token read from a local file.
    File(String),
    /// Ambient credential store (`huggingface-cli login`).
    Ambient,
}

impl AccessToken {
    /// Read the token file once at startup.
    ///
    /// A missing file is not an error: the ambient credential is used
    /// instead. Any other I/O failure propagates.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Self::File(raw.trim_end_matches('\n').to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::info!(
                    "no access token at {}, falling back to the ambient credential",
                    path.display()
                );
                Ok(Self::Ambient)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dream-guidance-{}-{}", std::process::id(), name))
    }

    #[test]
    fn missing_token_falls_back_to_ambient() {
        let token = AccessToken::load(scratch_path("no-such-token")).unwrap();
        assert_eq!(token, AccessToken::Ambient);
    }

    #[test]
    fn token_file_is_trimmed() {
        let path = scratch_path("token");
        fs::write(&path, "hf_secret\n").unwrap();

        let token = AccessToken::load(&path).unwrap();
        assert_eq!(token, AccessToken::File("hf_secret".into()));

        fs::remove_file(&path).unwrap();
    }
}
