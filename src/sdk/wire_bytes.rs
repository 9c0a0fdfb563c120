use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{error, warn};

use super::api::{BytesVec, DuetError, DuetResult};

const DUET_SERIALIZATION_VERSION: u16 = 0;

pub fn serialize<T: ?Sized>(value: &T) -> DuetResult<BytesVec>
where
    T: Serialize,
{
    match bincode::serialize(&BytesVecVersioned {
        version: DUET_SERIALIZATION_VERSION,
        payload: bincode::serialize(value).map_err(|err| {
            error!("serialization failure: {}", err.to_string());
            DuetError::InvariantViolation("serialization failure".to_string())
        })?,
    }) {
        Ok(bytes) => Ok(bytes),
        Err(err) => {
            error!("serialization failure: {}", err.to_string());
            Err(DuetError::InvariantViolation(
                "serialization failure".to_string(),
            ))
        }
    }
}

/// deserialization failures are non-fatal: do not return DuetResult
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    let bytes_versioned: BytesVecVersioned = bincode::deserialize(bytes)
        .map_err(|err| {
            warn!("outer deserialization failure: {}", err.to_string());
        })
        .ok()?;
    if bytes_versioned.version != DUET_SERIALIZATION_VERSION {
        warn!(
            "encoding version {}, expected {}",
            bytes_versioned.version, DUET_SERIALIZATION_VERSION
        );
        return None;
    }
    bincode::deserialize(&bytes_versioned.payload)
        .map_err(|err| {
            warn!("inner deserialization failure: {}", err.to_string());
        })
        .ok()
}

#[derive(Serialize, Deserialize)]
struct BytesVecVersioned {
    version: u16,
    payload: BytesVec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = (42u64, "psp".to_string());
        let bytes = serialize(&payload).unwrap();
        let recovered: (u64, String) = deserialize(&bytes).unwrap();
        assert_eq!(recovered, payload);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let bytes = bincode::serialize(&BytesVecVersioned {
            version: DUET_SERIALIZATION_VERSION + 1,
            payload: bincode::serialize(&7u8).unwrap(),
        })
        .unwrap();
        assert!(deserialize::<u8>(&bytes).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(deserialize::<u64>(b"not bincode").is_none());
    }
}
