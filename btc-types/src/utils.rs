/// Serde adapter serializing raw byte blobs as hex strings, the form block
/// headers travel in over JSON interfaces.
pub mod serd_vec_hex {
    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str: String = serde::Deserialize::deserialize(deserializer)?;
        hex::decode(&hex_str).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeHeaderError {
    InvalidLength,
}

impl std::fmt::Display for DecodeHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeHeaderError::InvalidLength => write!(f, "InvalidHeaderLength"),
        }
    }
}

impl std::error::Error for DecodeHeaderError {}
