use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use wopi_validator::proof_key::{canonical_payload, wopi_timestamp, ProofKeys, RSA_KEY_BITS};

const TOKEN: &str = "yZhdN1qgywcOQWhyEMVpB6NE4c";
const URL: &str = "https://contoso.com/wopi/files/vHxYyRGM8VfmSGwGYDBMIQPzuE+sSC6kw+zWZw2Nyg?access_token=yZhdN1qgywcOQWhyEMVpB6NE4c";
const TIMESTAMP: i64 = 635655897610773532;

/// Whole-buffer comparison against an independently assembled expectation.
#[test]
fn canonical_payload_matches_reference_assembly() {
    let payload = canonical_payload(TOKEN, URL, TIMESTAMP).unwrap();

    let upper = URL.to_uppercase();
    let mut expected = Vec::new();
    expected.extend_from_slice(&(TOKEN.len() as u32).to_be_bytes());
    expected.extend_from_slice(TOKEN.as_bytes());
    expected.extend_from_slice(&(upper.len() as u32).to_be_bytes());
    expected.extend_from_slice(upper.as_bytes());
    expected.extend_from_slice(&8u32.to_be_bytes());
    expected.extend_from_slice(&TIMESTAMP.to_be_bytes());

    assert_eq!(payload, expected);
}

#[test]
fn timestamps_are_monotonic_over_real_time() {
    let a = wopi_timestamp(chrono::Utc::now());
    let b = wopi_timestamp(chrono::Utc::now());
    assert!(a <= b);
    // A present-day timestamp is far beyond the Unix epoch in ticks.
    assert!(a > 621_355_968_000_000_000);
}

#[test]
fn keys_round_trip_through_pem_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = rand::thread_rng();
    let current = rsa::RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).unwrap();
    let old = rsa::RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).unwrap();

    let current_path = dir.path().join("current.pem");
    let old_path = dir.path().join("old.pem");
    std::fs::write(&current_path, current.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
    std::fs::write(&old_path, old.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();

    let keys = ProofKeys::from_paths(Some(&current_path), Some(&old_path)).unwrap();

    // Signatures from reloaded keys must match signing with the originals.
    let payload = canonical_payload(TOKEN, URL, TIMESTAMP).unwrap();
    let direct = {
        use rsa::pkcs1v15::SigningKey;
        use rsa::signature::{SignatureEncoding, Signer};
        use base64::Engine;
        let signing = SigningKey::<sha2::Sha256>::new(current);
        base64::engine::general_purpose::STANDARD.encode(signing.sign(&payload).to_bytes())
    };
    assert_eq!(keys.sign_current(&payload), direct);
}

#[test]
fn mismatched_key_flags_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("only.pem");
    std::fs::write(&path, "not a key").unwrap();
    assert!(ProofKeys::from_paths(Some(&path), None).is_err());
}

#[test]
fn export_is_indented_xml() {
    let keys = ProofKeys::generate().unwrap();
    let xml = keys.discovery_xml().unwrap();
    assert!(xml.contains("<wopi-discovery>"));
    assert!(xml.contains("</wopi-discovery>"));
    assert!(xml.contains("\n  <proof-key"));
}
