use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;
use tracing::info;

use crate::error::ValidatorError;

pub const RSA_KEY_BITS: usize = 2048;

const TICKS_PER_SECOND: i64 = 10_000_000;
// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const TICK_EPOCH_OFFSET_SECS: i64 = 62_135_596_800;

struct KeyPair {
    signing: SigningKey<Sha256>,
    public: RsaPublicKey,
}

impl KeyPair {
    fn from_private(key: RsaPrivateKey) -> Self {
        let public = key.to_public_key();
        KeyPair {
            signing: SigningKey::<Sha256>::new(key),
            public,
        }
    }
}

/// The current and old RSA proof keys. Read-only after startup.
pub struct ProofKeys {
    current: KeyPair,
    old: KeyPair,
}

impl ProofKeys {
    /// Generate a fresh pair of 2048-bit keys.
    pub fn generate() -> Result<Self, ValidatorError> {
        let mut rng = rand::thread_rng();
        let current = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| ValidatorError::Crypto(format!("key generation failed: {}", e)))?;
        let old = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| ValidatorError::Crypto(format!("key generation failed: {}", e)))?;
        Ok(ProofKeys {
            current: KeyPair::from_private(current),
            old: KeyPair::from_private(old),
        })
    }

    /// Load both keys from PKCS#8 PEM files.
    pub fn from_pem_files(current: &Path, old: &Path) -> Result<Self, ValidatorError> {
        Ok(ProofKeys {
            current: KeyPair::from_private(read_pem_key(current)?),
            old: KeyPair::from_private(read_pem_key(old)?),
        })
    }

    /// Resolve keys from configuration: both PEM paths, or neither.
    pub fn from_paths(
        current: Option<&Path>,
        old: Option<&Path>,
    ) -> Result<Self, ValidatorError> {
        match (current, old) {
            (Some(current), Some(old)) => {
                info!(
                    "Loading proof keys from {} and {}",
                    current.display(),
                    old.display()
                );
                Self::from_pem_files(current, old)
            }
            (None, None) => {
                info!("Generating fresh {}-bit proof keys", RSA_KEY_BITS);
                Self::generate()
            }
            _ => Err(ValidatorError::Configuration(
                "--proof-key-file and --old-proof-key-file must be given together".to_string(),
            )),
        }
    }

    pub fn sign_current(&self, payload: &[u8]) -> String {
        sign(&self.current.signing, payload)
    }

    pub fn sign_old(&self, payload: &[u8]) -> String {
        sign(&self.old.signing, payload)
    }

    /// Emit the `<wopi-discovery>` document carrying both public keys, so
    /// the host under test can be configured to trust this validator.
    pub fn discovery_xml(&self) -> Result<String, ValidatorError> {
        let (modulus, exponent) = public_key_parameters(&self.current.public);
        let (old_modulus, old_exponent) = public_key_parameters(&self.old.public);
        let value = public_key_value(&self.current.public)?;
        let old_value = public_key_value(&self.old.public)?;

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let mut proof_key = BytesStart::new("proof-key");
        proof_key.push_attribute(("value", value.as_str()));
        proof_key.push_attribute(("modulus", modulus.as_str()));
        proof_key.push_attribute(("exponent", exponent.as_str()));
        proof_key.push_attribute(("oldvalue", old_value.as_str()));
        proof_key.push_attribute(("oldmodulus", old_modulus.as_str()));
        proof_key.push_attribute(("oldexponent", old_exponent.as_str()));
        writer
            .write_event(Event::Start(BytesStart::new("wopi-discovery")))
            .map_err(xml_write_err)?;
        writer.write_event(Event::Empty(proof_key)).map_err(xml_write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("wopi-discovery")))
            .map_err(xml_write_err)?;

        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }
}

fn xml_write_err(e: impl std::fmt::Display) -> ValidatorError {
    ValidatorError::Crypto(format!("discovery serialization failed: {}", e))
}

fn read_pem_key(path: &Path) -> Result<RsaPrivateKey, ValidatorError> {
    let pem = std::fs::read_to_string(path).map_err(|e| {
        ValidatorError::Crypto(format!("could not read key file {}: {}", path.display(), e))
    })?;
    RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| {
        ValidatorError::Crypto(format!("invalid PKCS#8 key in {}: {}", path.display(), e))
    })
}

fn sign(key: &SigningKey<Sha256>, payload: &[u8]) -> String {
    BASE64.encode(key.sign(payload).to_bytes())
}

/// Canonical pre-signing bytes, in exact order: access-token length and
/// bytes, uppercased-URL length and bytes, timestamp length (always 8) and
/// big-endian value. All length prefixes are big-endian 32-bit.
pub fn canonical_payload(
    access_token: &str,
    url: &str,
    timestamp: i64,
) -> Result<Vec<u8>, ValidatorError> {
    if access_token.is_empty() {
        return Err(ValidatorError::Crypto(
            "an access token is required to build the proof payload".to_string(),
        ));
    }
    if !url.is_ascii() {
        return Err(ValidatorError::Crypto(format!(
            "proof URL must be ASCII: {}",
            url
        )));
    }

    let token_bytes = access_token.as_bytes();
    let upper_url = url.to_ascii_uppercase();
    let url_bytes = upper_url.as_bytes();
    let ts_bytes = timestamp.to_be_bytes();

    let mut payload = Vec::with_capacity(12 + token_bytes.len() + url_bytes.len() + 8);
    payload.extend_from_slice(&(token_bytes.len() as i32).to_be_bytes());
    payload.extend_from_slice(token_bytes);
    payload.extend_from_slice(&(url_bytes.len() as i32).to_be_bytes());
    payload.extend_from_slice(url_bytes);
    payload.extend_from_slice(&(ts_bytes.len() as i32).to_be_bytes());
    payload.extend_from_slice(&ts_bytes);
    Ok(payload)
}

/// .NET-style tick timestamp: 100-nanosecond units since 0001-01-01T00:00:00Z.
pub fn wopi_timestamp(now: DateTime<Utc>) -> i64 {
    (now.timestamp() + TICK_EPOCH_OFFSET_SECS) * TICKS_PER_SECOND
        + i64::from(now.timestamp_subsec_nanos()) / 100
}

/// Modulus and exponent as unpadded big-endian bytes, base-64 encoded.
pub fn public_key_parameters(key: &RsaPublicKey) -> (String, String) {
    (
        BASE64.encode(key.n().to_bytes_be()),
        BASE64.encode(key.e().to_bytes_be()),
    )
}

fn public_key_value(key: &RsaPublicKey) -> Result<String, ValidatorError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| ValidatorError::Crypto(format!("public key encoding failed: {}", e)))?;
    Ok(BASE64.encode(der.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;

    const TOKEN: &str = "yZhdN1qgywcOQWhyEMVpB6NE4c";
    const URL: &str = "https://contoso.com/wopi/files/vHxYyRGM8VfmSGwGYDBMIQPzuE+sSC6kw+zWZw2Nyg?access_token=yZhdN1qgywcOQWhyEMVpB6NE4c";
    const TIMESTAMP: i64 = 635655897610773532;

    #[test]
    fn canonical_payload_layout() {
        let payload = canonical_payload(TOKEN, URL, TIMESTAMP).unwrap();
        let upper = URL.to_ascii_uppercase();

        // 4-byte big-endian token length (26), then the token bytes.
        assert_eq!(&payload[0..4], &[0x00, 0x00, 0x00, 0x1A]);
        assert_eq!(&payload[4..30], TOKEN.as_bytes());

        // 4-byte big-endian URL length, then the uppercased URL bytes.
        let url_len = upper.len();
        assert_eq!(&payload[30..34], &(url_len as i32).to_be_bytes());
        assert_eq!(&payload[34..34 + url_len], upper.as_bytes());

        // 4-byte length of the timestamp encoding (always 8), then the
        // big-endian 64-bit timestamp.
        let rest = &payload[34 + url_len..];
        assert_eq!(&rest[0..4], &[0x00, 0x00, 0x00, 0x08]);
        assert_eq!(&rest[4..12], &TIMESTAMP.to_be_bytes());
        assert_eq!(payload.len(), 34 + url_len + 12);
    }

    #[test]
    fn canonical_payload_requires_token() {
        let err = canonical_payload("", URL, TIMESTAMP).unwrap_err();
        assert!(matches!(err, ValidatorError::Crypto(_)));
    }

    #[test]
    fn canonical_payload_rejects_non_ascii_url() {
        let err = canonical_payload(TOKEN, "http://hôst/wopi", TIMESTAMP).unwrap_err();
        assert!(matches!(err, ValidatorError::Crypto(_)));
    }

    #[test]
    fn timestamp_ticks_at_unix_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(wopi_timestamp(epoch), 621_355_968_000_000_000);
    }

    #[test]
    fn timestamp_ticks_count_hundred_nanos() {
        let t = Utc.timestamp_opt(1, 500).unwrap();
        assert_eq!(wopi_timestamp(t), 621_355_968_010_000_005);
    }

    #[test]
    fn signature_verifies_with_public_key() {
        let keys = ProofKeys::generate().unwrap();
        let payload = canonical_payload(TOKEN, URL, TIMESTAMP).unwrap();
        let sig_b64 = keys.sign_current(&payload);

        let sig_bytes = BASE64.decode(sig_b64).unwrap();
        let signature = Signature::try_from(sig_bytes.as_slice()).unwrap();
        let verifying = VerifyingKey::<Sha256>::new(keys.current.public.clone());
        verifying.verify(&payload, &signature).unwrap();
    }

    #[test]
    fn discovery_xml_carries_both_keys() {
        let keys = ProofKeys::generate().unwrap();
        let xml = keys.discovery_xml().unwrap();
        assert!(xml.starts_with("<wopi-discovery>"));
        for attr in [
            "value=",
            "modulus=",
            "exponent=",
            "oldvalue=",
            "oldmodulus=",
            "oldexponent=",
        ] {
            assert!(xml.contains(attr), "missing {} in {}", attr, xml);
        }
        let (modulus, exponent) = public_key_parameters(&keys.current.public);
        assert!(xml.contains(&modulus));
        assert!(xml.contains(&exponent));
    }
}
