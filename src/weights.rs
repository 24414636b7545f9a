//! Weight container parsing.
//!
//! The container is a single binary file: an 8-byte little-endian header
//! length, a UTF-8 JSON header mapping tensor names to their dtype, shape
//! and payload byte range, then the concatenated raw tensor payloads.
//! Tensors are sliced by name once at setup and never mutated.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Per-tensor metadata as declared in the container header.
///
/// `data_offsets` is stored relative to the payload start on disk and is
/// rewritten to absolute file offsets during parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct TensorMeta {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data_offsets: [usize; 2],
}

/// Parsed weight container: the raw bytes plus the resolved name table.
pub struct WeightStore {
    data: Vec<u8>,
    tensors: HashMap<String, TensorMeta>,
}

impl WeightStore {
    /// Parse a container from its full byte content.
    ///
    /// Malformed input (short header, invalid JSON, a byte range pointing
    /// outside the file) is fatal; nothing is salvaged from a container
    /// that fails any of these checks.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::ContainerTruncated(format!(
                "{} bytes is too short for the header length field",
                data.len()
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&data[..8]);
        let header_len = u64::from_le_bytes(len_bytes) as usize;

        let payload_start = 8 + header_len;
        if payload_start > data.len() {
            return Err(Error::ContainerTruncated(format!(
                "header claims {header_len} bytes but only {} remain",
                data.len() - 8
            )));
        }

        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&data[8..payload_start])?;

        let mut tensors = HashMap::with_capacity(header.len());
        for (name, value) in header {
            if name == "__metadata__" {
                continue;
            }
            let mut meta: TensorMeta = serde_json::from_value(value)?;

            // Rewrite the payload-relative range to absolute file offsets.
            let [start, end] = meta.data_offsets;
            meta.data_offsets = [payload_start + start, payload_start + end];
            if start > end || payload_start + end > data.len() {
                return Err(Error::ContainerTruncated(format!(
                    "tensor `{name}` spans [{start}, {end}) past the payload"
                )));
            }
            tensors.insert(name, meta);
        }

        log::debug!(
            "weight container: {} tensors, {} payload bytes",
            tensors.len(),
            data.len() - payload_start
        );

        Ok(Self { data, tensors })
    }

    /// Read and parse a container file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(std::fs::read(path)?)
    }

    /// Raw bytes of the named tensor, exactly `[start, end)`.
    ///
    /// The slice is meant to be reinterpreted as little-endian f32.
    pub fn get(&self, name: &str) -> Result<&[u8]> {
        let meta = self
            .tensors
            .get(name)
            .ok_or_else(|| Error::TensorNotFound(name.to_string()))?;
        let [start, end] = meta.data_offsets;
        Ok(&self.data[start..end])
    }

    /// Header metadata of the named tensor, offsets already absolute.
    pub fn meta(&self, name: &str) -> Option<&TensorMeta> {
        self.tensors.get(name)
    }

    /// Names of every tensor in the container.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Number of tensors in the container.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// True when the container declares no tensors.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// Decode a little-endian f32 byte range into host floats.
///
/// The byte length must be a whole number of f32 values. Works on any
/// alignment, so container slices can be decoded in place.
pub fn decode_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::UnalignedTensor(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(header.len() as u64).to_le_bytes());
        data.extend_from_slice(header.as_bytes());
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn slices_at_absolute_offsets() {
        let header = r#"{"__metadata__":{"format":"pt"},"w":{"dtype":"F32","shape":[4],"data_offsets":[0,16]}}"#;
        let payload: Vec<u8> = (0u8..16).collect();
        let data = container(header, &payload);
        let header_len = header.len();

        let store = WeightStore::parse(data).unwrap();
        let bytes = store.get("w").unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes, &payload[..]);
        assert_eq!(
            store.meta("w").unwrap().data_offsets,
            [8 + header_len, 8 + header_len + 16]
        );
    }

    #[test]
    fn metadata_entry_is_skipped() {
        let header = r#"{"__metadata__":{"whatever":"x"},"a":{"dtype":"F32","shape":[1],"data_offsets":[0,4]}}"#;
        let store = WeightStore::parse(container(header, &[0; 4])).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.meta("__metadata__").is_none());
    }

    #[test]
    fn missing_tensor_is_fatal() {
        let header = r#"{"a":{"dtype":"F32","shape":[1],"data_offsets":[0,4]}}"#;
        let store = WeightStore::parse(container(header, &[0; 4])).unwrap();
        assert!(matches!(store.get("b"), Err(Error::TensorNotFound(_))));
    }

    #[test]
    fn truncated_header_is_fatal() {
        assert!(matches!(
            WeightStore::parse(vec![1, 2, 3]),
            Err(Error::ContainerTruncated(_))
        ));
        // Claims a 100-byte header over a 10-byte file.
        let mut data = 100u64.to_le_bytes().to_vec();
        data.extend_from_slice(b"{}");
        assert!(matches!(
            WeightStore::parse(data),
            Err(Error::ContainerTruncated(_))
        ));
    }

    #[test]
    fn invalid_json_is_fatal() {
        let store = WeightStore::parse(container("not json", &[]));
        assert!(matches!(store, Err(Error::ContainerHeader(_))));
    }

    #[test]
    fn range_past_payload_is_fatal() {
        let header = r#"{"a":{"dtype":"F32","shape":[4],"data_offsets":[0,16]}}"#;
        let store = WeightStore::parse(container(header, &[0; 8]));
        assert!(matches!(store, Err(Error::ContainerTruncated(_))));
    }

    #[test]
    fn decode_rejects_ragged_lengths() {
        assert!(matches!(decode_f32(&[0; 6]), Err(Error::UnalignedTensor(6))));
        let floats = decode_f32(&1.5f32.to_le_bytes()).unwrap();
        assert_eq!(floats, vec![1.5]);
    }
}
