//! Q-value models trained by the session consumer (`spec.md` §4.3 steps 2-3,
//! §6 "Model payload format"). Hand-rolled rather than built on a tensor
//! framework: both topologies are a handful of dense layers trained by plain
//! SGD, which doesn't need more machinery than `Vec<f32>`.

use crate::error::ModelError;
use crate::protocol::model_payload::{pack_weights, unpack_weights, ModelFormat, ModelPayload, ModelTopology};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const DEFAULT_HIDDEN_SIZE: usize = 64;

#[derive(Debug, Clone)]
enum Body {
    Linear { kernel: Vec<f32>, bias: Vec<f32> },
    Mlp { w1: Vec<f32>, b1: Vec<f32>, w2: Vec<f32>, b2: Vec<f32> },
}

/// A trained instance bound to one `(mapKey, modelKey)` pair. Lives for the
/// lifetime of the session's AIB consumer; persisted to MS periodically.
#[derive(Debug, Clone)]
pub struct QModel {
    pub model_key: String,
    pub map_key: String,
    pub state_size: usize,
    pub action_size: usize,
    hidden_size: Option<usize>,
    body: Body,
    pub steps: u64,
    pub episodes: u64,
    pub epsilon: f32,
    pub last_saved_steps: u64,
}

fn init_vec(rng: &mut SmallRng, len: usize, scale: f32) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-scale..scale)).collect()
}

impl QModel {
    /// Fresh MLP-Q instance, matching `spec.md` §4.3 step 2 ("create a fresh
    /// MLP-Q model with hidden size 64 and this stateSize").
    pub fn new_mlp(model_key: String, map_key: String, state_size: usize, action_size: usize, epsilon_start: f32, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let hidden = DEFAULT_HIDDEN_SIZE;
        let scale = 1.0 / (state_size as f32).sqrt();
        Self {
            model_key,
            map_key,
            state_size,
            action_size,
            hidden_size: Some(hidden),
            body: Body::Mlp {
                w1: init_vec(&mut rng, state_size * hidden, scale),
                b1: vec![0.0; hidden],
                w2: init_vec(&mut rng, hidden * action_size, 1.0 / (hidden as f32).sqrt()),
                b2: vec![0.0; action_size],
            },
            steps: 0,
            episodes: 0,
            epsilon: epsilon_start,
            last_saved_steps: 0,
        }
    }

    /// Q-values for every action given a state vector.
    pub fn forward(&self, state: &[f32]) -> Result<Vec<f32>, ModelError> {
        if state.len() != self.state_size {
            return Err(ModelError::StateSizeMismatch { expected: self.state_size, actual: state.len() });
        }
        Ok(match &self.body {
            Body::Linear { kernel, bias } => {
                let mut out = bias.clone();
                for (s_idx, &s) in state.iter().enumerate() {
                    for a in 0..self.action_size {
                        out[a] += s * kernel[s_idx * self.action_size + a];
                    }
                }
                out
            }
            Body::Mlp { w1, b1, w2, b2 } => {
                let hidden = self.hidden_size.unwrap_or(DEFAULT_HIDDEN_SIZE);
                let mut h = b1.clone();
                for (s_idx, &s) in state.iter().enumerate() {
                    for j in 0..hidden {
                        h[j] += s * w1[s_idx * hidden + j];
                    }
                }
                for v in h.iter_mut() {
                    *v = v.max(0.0);
                }
                let mut out = b2.clone();
                for (j, &hv) in h.iter().enumerate() {
                    for a in 0..self.action_size {
                        out[a] += hv * w2[j * self.action_size + a];
                    }
                }
                out
            }
        })
    }

    /// One Q-learning SGD step: `target = reward + gamma * max(Q(next))`,
    /// backprop the TD error through the action head taken. Returns the TD
    /// error (used for loss metrics) and decays `epsilon` with a floor.
    pub fn train_step(
        &mut self,
        state: &[f32],
        action_index: usize,
        reward: f32,
        next_state: &[f32],
        gamma: f32,
        lr: f32,
        epsilon_min: f32,
        epsilon_decay: f32,
    ) -> Result<f32, ModelError> {
        let next_q = self.forward(next_state)?;
        let max_next = next_q.iter().cloned().fold(f32::NEG_INFINITY, f32::max).max(0.0);
        let target = reward + gamma * max_next;

        let td_error = match &mut self.body {
            Body::Linear { kernel, bias } => {
                let mut q = bias.clone();
                for (s_idx, &s) in state.iter().enumerate() {
                    for a in 0..self.action_size {
                        q[a] += s * kernel[s_idx * self.action_size + a];
                    }
                }
                let error = target - q[action_index];
                bias[action_index] += lr * error;
                for (s_idx, &s) in state.iter().enumerate() {
                    kernel[s_idx * self.action_size + action_index] += lr * error * s;
                }
                error
            }
            Body::Mlp { w1, b1, w2, b2 } => {
                let hidden = self.hidden_size.unwrap_or(DEFAULT_HIDDEN_SIZE);
                let mut pre_h = b1.clone();
                for (s_idx, &s) in state.iter().enumerate() {
                    for j in 0..hidden {
                        pre_h[j] += s * w1[s_idx * hidden + j];
                    }
                }
                let h: Vec<f32> = pre_h.iter().map(|v| v.max(0.0)).collect();
                let mut q = b2.clone();
                for (j, &hv) in h.iter().enumerate() {
                    for a in 0..self.action_size {
                        q[a] += hv * w2[j * self.action_size + a];
                    }
                }
                let error = target - q[action_index];

                b2[action_index] += lr * error;
                for (j, &hv) in h.iter().enumerate() {
                    w2[j * self.action_size + action_index] += lr * error * hv;
                }

                for j in 0..hidden {
                    if pre_h[j] <= 0.0 {
                        continue;
                    }
                    let grad_h = error * w2[j * self.action_size + action_index];
                    b1[j] += lr * grad_h;
                    for (s_idx, &s) in state.iter().enumerate() {
                        w1[s_idx * hidden + j] += lr * grad_h * s;
                    }
                }
                error
            }
        };

        self.steps += 1;
        self.epsilon = (self.epsilon * epsilon_decay).max(epsilon_min);
        Ok(td_error)
    }

    /// ε-greedy action selection over the fixed action table indices.
    pub fn select_action(&self, state: &[f32], rng: &mut SmallRng) -> Result<usize, ModelError> {
        if rng.gen_range(0.0..1.0) < self.epsilon {
            return Ok(rng.gen_range(0..self.action_size));
        }
        let q = self.forward(state)?;
        Ok(q.iter().enumerate().max_by(|a, b| a.1.partial_cmp(b.1).unwrap()).map(|(i, _)| i).unwrap_or(0))
    }

    pub fn to_payload(&self) -> (ModelPayload, serde_json::Value, serde_json::Value) {
        let hidden = self.hidden_size.unwrap_or(DEFAULT_HIDDEN_SIZE);
        let kernel_shape = [self.state_size, self.action_size];
        let bias_shape = [self.action_size];
        let w1_shape = [self.state_size, hidden];
        let b1_shape = [hidden];
        let w2_shape = [hidden, self.action_size];
        let (format, named): (ModelFormat, Vec<(&str, &[usize], &[f32])>) = match &self.body {
            Body::Linear { kernel, bias } => {
                (ModelFormat::LinearQ, vec![("kernel", &kernel_shape[..], kernel.as_slice()), ("bias", &bias_shape[..], bias.as_slice())])
            }
            Body::Mlp { w1, b1, w2, b2 } => (
                ModelFormat::MlpQ,
                vec![
                    ("w1", &w1_shape[..], w1.as_slice()),
                    ("b1", &b1_shape[..], b1.as_slice()),
                    ("w2", &w2_shape[..], w2.as_slice()),
                    ("b2", &bias_shape[..], b2.as_slice()),
                ],
            ),
        };
        let (blob, specs) = pack_weights(&named);
        let payload = ModelPayload {
            model_topology: ModelTopology { format, state_size: self.state_size, action_size: self.action_size, hidden_size: self.hidden_size },
            weight_specs: specs,
            weight_data_base64: blob,
            user_defined_metadata: json!({"mapKey": self.map_key}),
        };
        let training_config = json!({
            "steps": self.steps,
            "episodes": self.episodes,
            "epsilon": self.epsilon,
            "lastSavedSteps": self.steps,
        });
        (payload, training_config, json!({"mapKey": self.map_key}))
    }

    pub fn from_payload(model_key: String, map_key: String, payload: &ModelPayload, training_config: &serde_json::Value) -> Result<Self, ModelError> {
        let topology = &payload.model_topology;
        let arrays = unpack_weights(&payload.weight_specs, &payload.weight_data_base64)?;
        let body = match topology.format {
            ModelFormat::LinearQ => {
                let kernel = arrays.first().cloned().unwrap_or_default();
                let bias = arrays.get(1).cloned().unwrap_or_default();
                Body::Linear { kernel, bias }
            }
            ModelFormat::MlpQ => {
                let w1 = arrays.first().cloned().unwrap_or_default();
                let b1 = arrays.get(1).cloned().unwrap_or_default();
                let w2 = arrays.get(2).cloned().unwrap_or_default();
                let b2 = arrays.get(3).cloned().unwrap_or_default();
                Body::Mlp { w1, b1, w2, b2 }
            }
        };
        Ok(Self {
            model_key,
            map_key,
            state_size: topology.state_size,
            action_size: topology.action_size,
            hidden_size: topology.hidden_size,
            body,
            steps: training_config.get("steps").and_then(|v| v.as_u64()).unwrap_or(0),
            episodes: training_config.get("episodes").and_then(|v| v.as_u64()).unwrap_or(0),
            epsilon: training_config.get("epsilon").and_then(|v| v.as_f64()).unwrap_or(0.2) as f32,
            last_saved_steps: training_config.get("lastSavedSteps").and_then(|v| v.as_u64()).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_rejects_wrong_state_size() {
        let model = QModel::new_mlp("k".into(), "default".into(), 27, 10, 0.2, 1);
        let err = model.forward(&[0.0; 10]).unwrap_err();
        assert!(matches!(err, ModelError::StateSizeMismatch { expected: 27, actual: 10 }));
    }

    #[test]
    fn train_step_reduces_td_error_toward_target_over_iterations() {
        let mut model = QModel::new_mlp("k".into(), "default".into(), 4, 2, 0.0, 7);
        let state = [0.1, 0.2, -0.1, 0.3];
        let next = [0.0; 4];
        let mut last_abs = f32::INFINITY;
        for _ in 0..200 {
            let err = model.train_step(&state, 0, 1.0, &next, 0.9, 0.05, 0.01, 1.0).unwrap();
            last_abs = err.abs();
        }
        assert!(last_abs < 1.0);
    }

    #[test]
    fn payload_round_trips_through_pack_and_unpack() {
        let model = QModel::new_mlp("k".into(), "stage03".into(), 27, 10, 0.2, 3);
        let (payload, training_config, _) = model.to_payload();
        let restored = QModel::from_payload("k".into(), "stage03".into(), &payload, &training_config).unwrap();
        let state = vec![0.05f32; 27];
        assert_eq!(model.forward(&state).unwrap(), restored.forward(&state).unwrap());
    }
}
