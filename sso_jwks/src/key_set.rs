use aliri_base64::Base64Url;
use aliri_braid::braid;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::PublicKeyError;

/// The `use` of a key that may verify signatures
pub const SIGNING_USE: &str = "sig";

/// Public exponents are read as big-endian integers of this many bytes
const EXPONENT_WIDTH: usize = 4;

/// A key identifier
#[braid(serde, ref_doc = "A borrowed reference to a key identifier ([`KeyId`])")]
pub struct KeyId;

/// A public signing key descriptor published by the identity service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    #[serde(rename = "alg", default)]
    algorithm: String,
    #[serde(rename = "e", default)]
    exponent: String,
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    key_id: Option<KeyId>,
    #[serde(rename = "kty", default)]
    key_type: String,
    #[serde(rename = "n", default)]
    modulus: String,
    #[serde(rename = "use", default)]
    usage: String,
}

impl KeySet {
    /// The identifier of this key, if any
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The algorithm this key is meant to be used with
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The key type, such as `RSA`
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// The intended use of the key, such as `sig`
    pub fn usage(&self) -> &str {
        &self.usage
    }

    /// The base64url-encoded public modulus
    pub fn modulus(&self) -> &str {
        &self.modulus
    }

    /// The base64url-encoded public exponent
    pub fn exponent(&self) -> &str {
        &self.exponent
    }

    /// Whether this key is intended for verifying signatures
    pub fn is_signing_key(&self) -> bool {
        self.usage == SIGNING_USE
    }

    /// Reconstructs the RSA public key described by this entry
    ///
    /// Exponents shorter than four bytes are left-padded with zeros before
    /// being read as a big-endian integer.
    ///
    /// # Errors
    ///
    /// Returns an error if either component is not valid base64url or if the
    /// exponent does not fit in four bytes. No limits are placed on the size
    /// of the modulus or the value of the exponent.
    pub fn public_key(&self) -> Result<RsaPublicKey, PublicKeyError> {
        let exponent = decode_component(&self.exponent, "e")?;
        let exponent = exponent_from_be(exponent.as_slice())?;

        let modulus = decode_component(&self.modulus, "n")?;

        Ok(RsaPublicKey::new_unchecked(
            BigUint::from_bytes_be(modulus.as_slice()),
            BigUint::from(exponent),
        ))
    }
}

fn decode_component(encoded: &str, field: &'static str) -> Result<Base64Url, PublicKeyError> {
    Base64Url::from_encoded(encoded).map_err(|source| PublicKeyError::Decode { field, source })
}

fn exponent_from_be(raw: &[u8]) -> Result<u32, PublicKeyError> {
    if raw.len() > EXPONENT_WIDTH {
        return Err(PublicKeyError::ExponentTooLarge { len: raw.len() });
    }

    let mut padded = [0u8; EXPONENT_WIDTH];
    padded[EXPONENT_WIDTH - raw.len()..].copy_from_slice(raw);
    Ok(u32::from_be_bytes(padded))
}

/// An ordered collection of key descriptors
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySets(Vec<KeySet>);

impl KeySets {
    /// A view of the keys in this collection
    pub fn keys(&self) -> &[KeySet] {
        &self.0
    }

    /// Whether the collection holds no keys
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of keys in the collection
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Finds the first signing key with the given identifier
    ///
    /// Keys whose `use` is anything other than `sig` are never returned.
    pub fn find_signing_key(&self, kid: &KeyIdRef) -> Option<&KeySet> {
        self.0
            .iter()
            .find(|k| k.is_signing_key() && k.key_id() == Some(kid))
    }
}

impl From<Vec<KeySet>> for KeySets {
    fn from(keys: Vec<KeySet>) -> Self {
        Self(keys)
    }
}

impl IntoIterator for KeySets {
    type Item = KeySet;
    type IntoIter = std::vec::IntoIter<KeySet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The key-set document served by the identity service
#[derive(Debug, Deserialize)]
pub(crate) struct KeySetDocument {
    #[serde(rename = "Keys", alias = "keys")]
    pub(crate) keys: KeySets,
}


#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use rsa::traits::PublicKeyParts;

    use super::*;

    #[test]
    fn short_exponent_is_left_padded() -> Result<()> {
        let key = test_keys::signing("key-1");

        let public = key.public_key()?;

        assert_eq!(*public.e(), BigUint::from(65537u32));
        assert_eq!(
            *public.n(),
            BigUint::from_bytes_be(&[test_keys::MODULUS_BYTE; 256])
        );
        Ok(())
    }

    fn with_components(modulus: &[u8], exponent: &[u8]) -> KeySet {
        let mut raw = test_keys::json("key-1", "sig");
        raw["n"] = Base64Url::from_raw(modulus.to_vec()).to_string().into();
        raw["e"] = Base64Url::from_raw(exponent.to_vec()).to_string().into();
        serde_json::from_value(raw).expect("valid key set")
    }

    #[test]
    fn large_modulus_is_reconstructed() -> Result<()> {
        let key = with_components(&[test_keys::MODULUS_BYTE; 1024], &[1, 0, 1]);

        let public = key.public_key()?;

        assert_eq!(public.n().bits(), 8192);
        assert_eq!(*public.e(), BigUint::from(65537u32));
        Ok(())
    }

    #[test]
    fn single_byte_exponent_is_reconstructed() -> Result<()> {
        let key = with_components(&[test_keys::MODULUS_BYTE; 256], &[1]);

        let public = key.public_key()?;

        assert_eq!(*public.e(), BigUint::from(1u32));
        assert_eq!(public.n().bits(), 2048);
        Ok(())
    }

    #[test]
    fn exponent_padding_reads_big_endian() -> Result<()> {
        assert_eq!(exponent_from_be(&[1, 0, 1])?, 65537);
        assert_eq!(exponent_from_be(&[3])?, 3);
        assert_eq!(exponent_from_be(&[0, 1, 0, 1])?, 65537);
        assert_eq!(exponent_from_be(&[])?, 0);
        Ok(())
    }

    #[test]
    fn oversized_exponent_is_rejected() {
        let err = exponent_from_be(&[1, 0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, PublicKeyError::ExponentTooLarge { len: 5 }));
    }

    #[test]
    fn malformed_modulus_names_the_field() {
        let mut raw = test_keys::json("key-1", "sig");
        raw["n"] = "not base64!".into();
        let key: KeySet = serde_json::from_value(raw).unwrap();

        let err = key.public_key().unwrap_err();

        assert!(matches!(err, PublicKeyError::Decode { field: "n", .. }));
        assert_eq!(err.to_string(), "failed to decode key set `n`");
    }

    #[test]
    fn malformed_exponent_names_the_field() {
        let mut raw = test_keys::json("key-1", "sig");
        raw["e"] = "***".into();
        let key: KeySet = serde_json::from_value(raw).unwrap();

        let err = key.public_key().unwrap_err();

        assert!(matches!(err, PublicKeyError::Decode { field: "e", .. }));
    }

    #[test]
    fn lookup_ignores_non_signing_keys() -> Result<()> {
        let document: KeySetDocument = serde_json::from_value(test_keys::document(&[
            test_keys::json("enc-key", "enc"),
            test_keys::json("sig-key", "sig"),
        ]))?;

        let kid = KeyIdRef::from_str;
        assert!(document.keys.find_signing_key(kid("enc-key")).is_none());
        assert_eq!(
            document
                .keys
                .find_signing_key(kid("sig-key"))
                .and_then(KeySet::key_id),
            Some(kid("sig-key"))
        );
        Ok(())
    }

    #[test]
    fn document_accepts_lowercase_keys_and_missing_fields() -> Result<()> {
        let document: KeySetDocument =
            serde_json::from_str(r#"{"keys":[{"kid":"k1","use":"sig"},{"kty":"RSA"}]}"#)?;

        assert_eq!(document.keys.len(), 2);
        assert_eq!(document.keys.keys()[1].key_id(), None);
        assert_eq!(document.keys.keys()[1].modulus(), "");
        Ok(())
    }
}
