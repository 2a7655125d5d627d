use crate::error::{Result, UpdaterError};
use crate::version::VersionTag;
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::convert::TryInto;

/// Body POSTed to the update-check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRequest {
    /// Version of the running executable, e.g. `v1.2.3`.
    pub app_version: String,
    /// Target operating system (`std::env::consts::OS`).
    pub os: String,
    /// Target architecture (`std::env::consts::ARCH`).
    pub arch: String,
}

impl CheckRequest {
    /// Request describing the current platform running `version`.
    pub fn for_current_platform(version: &VersionTag) -> Self {
        Self {
            app_version: version.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// How the payload at `patch_url` turns the current executable into the new one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchType {
    /// A bsdiff delta against the current executable.
    Bsdiff,
    /// The complete new executable.
    Full,
}

/// The data covered by the release signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedRelease {
    /// Target version tag of the release.
    pub version: String,
    /// Location of the patch payload.
    pub patch_url: String,
    /// Format of the payload.
    pub patch_type: PatchType,
    /// Expected SHA-256 digest (hex encoded, lowercase) of the patched executable.
    pub checksum: String,
}

impl SignedRelease {
    /// Parse the target version.
    pub fn parsed_version(&self) -> Result<VersionTag> {
        VersionTag::parse(&self.version)
            .map_err(|err| UpdaterError::protocol(format!("release carries {err}")))
    }
}

/// Signed release metadata returned by the update-check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseManifest {
    #[serde(flatten)]
    pub signed: SignedRelease,
    /// Base64 encoded Ed25519 signature over the canonical JSON of [`SignedRelease`].
    pub signature: String,
}

impl ReleaseManifest {
    /// Render the signed payload to the canonical JSON bytes that were signed.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.signed)?)
    }

    /// Parse the Ed25519 signature from the manifest.
    pub fn parsed_signature(&self) -> Result<Signature> {
        let raw = general_purpose::STANDARD
            .decode(self.signature.as_bytes())
            .map_err(|_| UpdaterError::SignatureInvalid)?;

        let array: [u8; 64] = raw
            .try_into()
            .map_err(|_| UpdaterError::SignatureInvalid)?;
        Ok(Signature::from_bytes(&array))
    }

    /// Check the signature against `key`.
    pub fn verify(&self, key: &VerifyingKey) -> Result<()> {
        let signature = self.parsed_signature()?;
        let payload = self.signing_bytes()?;
        key.verify(&payload, &signature)
            .map_err(|_| UpdaterError::SignatureInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ed25519_dalek::{Signer, SigningKey};

    fn signed_manifest(key: &SigningKey) -> ReleaseManifest {
        let signed = SignedRelease {
            version: "v1.2.0".into(),
            patch_url: "https://updates.example.com/patches/v1.2.0".into(),
            patch_type: PatchType::Bsdiff,
            checksum: "00".repeat(32),
        };
        let signature = key.sign(&serde_json::to_vec(&signed).unwrap());
        ReleaseManifest {
            signed,
            signature: general_purpose::STANDARD.encode(signature.to_bytes()),
        }
    }

    #[test]
    fn verifies_with_matching_key() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let manifest = signed_manifest(&key);
        manifest.verify(&key.verifying_key()).unwrap();
    }

    #[test]
    fn rejects_other_key_and_tampering() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let other = SigningKey::from_bytes(&[8u8; 32]);
        let mut manifest = signed_manifest(&key);

        let err = manifest.verify(&other.verifying_key()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Verification);

        manifest.signed.version = "v9.9.9".into();
        let err = manifest.verify(&key.verifying_key()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Verification);
    }

    #[test]
    fn malformed_signature_is_a_verification_error() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let mut manifest = signed_manifest(&key);
        manifest.signature = "AAAA".into();
        assert!(matches!(
            manifest.verify(&key.verifying_key()),
            Err(UpdaterError::SignatureInvalid)
        ));
    }

    #[test]
    fn wire_format_is_flat() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let value = serde_json::to_value(signed_manifest(&key)).unwrap();
        assert_eq!(value["version"], "v1.2.0");
        assert_eq!(value["patch_type"], "bsdiff");
        assert!(value["signature"].is_string());
    }

    #[test]
    fn bad_release_version_is_a_protocol_error() {
        let release = SignedRelease {
            version: "1.2.0".into(),
            patch_url: String::new(),
            patch_type: PatchType::Full,
            checksum: String::new(),
        };
        assert_eq!(release.parsed_version().unwrap_err().kind(), ErrorKind::Protocol);
    }
}
