use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;

/// Process-wide pre-shared symmetric key (AES-256, so 32 bytes).
///
/// Serializes as a base64 string so it can live in a TOML config file,
/// mirroring how the teacher's `SessionKey` is carried in `GameConfig`.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; Key::SIZE]);

impl Key {
    pub const SIZE: usize = 32;

    #[inline]
    pub fn new(bytes: [u8; Self::SIZE]) -> Key {
        Key(bytes)
    }

    #[inline]
    pub fn zero() -> Key {
        Key([0u8; Self::SIZE])
    }
}

impl Deref for Key {
    type Target = [u8; Key::SIZE];

    #[inline]
    fn deref(&self) -> &[u8; Key::SIZE] {
        &self.0
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Key, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <&str>::deserialize(deserializer)?;
        let decoded = BASE64.decode(s).map_err(de::Error::custom)?;

        if decoded.len() != Key::SIZE {
            return Err(de::Error::custom(format!(
                "pre-shared key must decode to {} bytes, got {}",
                Key::SIZE,
                decoded.len()
            )));
        }

        let mut bytes = [0u8; Key::SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Key(bytes))
    }
}
