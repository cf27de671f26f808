//! Model weight payload wire format (`spec.md` §6 "Model payload format").
//!
//! Weight arrays are packed as little-endian `f32` and base64-encoded for
//! JSON transport, per `SPEC_FULL.md` §6.

use crate::error::ModelError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFormat {
    LinearQ,
    MlpQ,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTopology {
    pub format: ModelFormat,
    #[serde(rename = "stateSize")]
    pub state_size: usize,
    #[serde(rename = "actionSize")]
    pub action_size: usize,
    #[serde(rename = "hiddenSize", skip_serializing_if = "Option::is_none")]
    pub hidden_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPayload {
    #[serde(rename = "modelTopology")]
    pub model_topology: ModelTopology,
    #[serde(rename = "weightSpecs")]
    pub weight_specs: Vec<WeightSpec>,
    #[serde(rename = "weightDataBase64")]
    pub weight_data_base64: String,
    #[serde(rename = "userDefinedMetadata")]
    pub user_defined_metadata: serde_json::Value,
}

/// Packs named weight arrays into one little-endian blob plus the spec list,
/// in the order the topology format requires (`linear-q: kernel,bias` or
/// `mlp-q: w1,b1,w2,b2`).
pub fn pack_weights(named: &[(&str, &[usize], &[f32])]) -> (String, Vec<WeightSpec>) {
    let mut buf = Vec::new();
    let mut specs = Vec::with_capacity(named.len());
    for (name, shape, values) in named {
        for v in values.iter() {
            buf.write_f32::<LittleEndian>(*v).expect("vec write is infallible");
        }
        specs.push(WeightSpec { name: name.to_string(), shape: shape.to_vec(), dtype: "float32".to_string() });
    }
    (BASE64.encode(buf), specs)
}

/// Unpacks a base64 little-endian blob into per-array `f32` vectors, using
/// the `shape` of each spec to determine element counts.
pub fn unpack_weights(specs: &[WeightSpec], blob_b64: &str) -> Result<Vec<Vec<f32>>, ModelError> {
    let bytes = BASE64
        .decode(blob_b64)
        .map_err(|e| ModelError::MalformedWeights(e.to_string()))?;
    let mut cursor = std::io::Cursor::new(bytes);
    let mut arrays = Vec::with_capacity(specs.len());
    for spec in specs {
        let count: usize = spec.shape.iter().product::<usize>().max(1);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let v = cursor
                .read_f32::<LittleEndian>()
                .map_err(|e| ModelError::MalformedWeights(e.to_string()))?;
            values.push(v);
        }
        arrays.push(values);
    }
    Ok(arrays)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack_round_trips() {
        let kernel = vec![0.1f32, 0.2, 0.3, 0.4];
        let bias = vec![1.0f32, 2.0];
        let (blob, specs) = pack_weights(&[("kernel", &[2, 2], &kernel), ("bias", &[2], &bias)]);
        let unpacked = unpack_weights(&specs, &blob).unwrap();
        assert_eq!(unpacked[0], kernel);
        assert_eq!(unpacked[1], bias);
    }

    #[test]
    fn unpack_rejects_invalid_base64() {
        let specs = vec![WeightSpec { name: "x".into(), shape: vec![1], dtype: "float32".into() }];
        assert!(unpack_weights(&specs, "not-base64!!").is_err());
    }
}
