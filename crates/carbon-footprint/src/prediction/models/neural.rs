use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Axis, Dimension, Zip};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{FitError, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralParams {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Smallest training set the network will accept.
    pub min_training_rows: usize,
}

impl Default for NeuralParams {
    fn default() -> Self {
        Self {
            hidden_layers: vec![128, 64, 32],
            learning_rate: 0.001,
            batch_size: 32,
            epochs: 100,
            min_training_rows: 32,
        }
    }
}

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dense {
    /// `inputs x outputs`.
    weights: Array2<f64>,
    biases: Array1<f64>,
}

impl Dense {
    fn new(inputs: usize, outputs: usize, rng: &mut SmallRng) -> Self {
        let limit = (6.0 / inputs.max(1) as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit)),
            biases: Array1::zeros(outputs),
        }
    }

    /// Forward pass for a batch laid out one row per sample.
    fn forward(&self, input: ArrayView2<'_, f64>, relu: bool) -> Array2<f64> {
        let z = input.dot(&self.weights) + &self.biases;
        if relu {
            z.mapv_into(|value| value.max(0.0))
        } else {
            z
        }
    }
}

/// First and second moment estimates for one layer.
#[derive(Debug, Clone)]
struct Moments {
    weights_m: Array2<f64>,
    weights_v: Array2<f64>,
    biases_m: Array1<f64>,
    biases_v: Array1<f64>,
}

impl Moments {
    fn zeros(layer: &Dense) -> Self {
        Self {
            weights_m: Array2::zeros(layer.weights.raw_dim()),
            weights_v: Array2::zeros(layer.weights.raw_dim()),
            biases_m: Array1::zeros(layer.biases.raw_dim()),
            biases_v: Array1::zeros(layer.biases.raw_dim()),
        }
    }
}

fn adam_step<D: Dimension>(
    params: &mut Array<f64, D>,
    grads: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr: f64,
    step: i32,
) {
    let correction1 = 1.0 - BETA1.powi(step);
    let correction2 = 1.0 - BETA2.powi(step);
    Zip::from(params)
        .and(grads)
        .and(m)
        .and(v)
        .for_each(|param, &grad, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * grad;
            *v = BETA2 * *v + (1.0 - BETA2) * grad * grad;
            let m_hat = *m / correction1;
            let v_hat = *v / correction2;
            *param -= lr * m_hat / (v_hat.sqrt() + EPSILON);
        });
}

/// Standardization parameters for a single value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Scale {
    mean: f64,
    std: f64,
}

impl Scale {
    fn fit(values: ArrayView1<'_, f64>) -> Self {
        let mean = values.mean().unwrap_or(0.0);
        let variance = values
            .mapv(|value| (value - mean).powi(2))
            .mean()
            .unwrap_or(0.0);
        Self {
            mean,
            std: usable_std(variance.sqrt()),
        }
    }

    fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    fn invert(&self, value: f64) -> f64 {
        value * self.std + self.mean
    }
}

/// Per-column standardization of the design matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ColumnScale {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl ColumnScale {
    fn fit(x: ArrayView2<'_, f64>) -> Self {
        Self {
            mean: x
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(x.ncols())),
            std: x.std_axis(Axis(0), 0.0).mapv_into(usable_std),
        }
    }

    fn apply(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.mean) / &self.std
    }
}

fn usable_std(std: f64) -> f64 {
    if std > 1e-12 {
        std
    } else {
        1.0
    }
}

/// Fully connected ReLU network trained with Adam on standardized inputs and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetwork {
    layers: Vec<Dense>,
    inputs: ColumnScale,
    target: Scale,
}

impl NeuralNetwork {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &NeuralParams,
        seed: u64,
    ) -> Result<Self, FitError> {
        let (rows, width) = x.dim();
        let required = params.min_training_rows.max(1);
        if rows < required {
            return Err(FitError::InsufficientData { rows, required });
        }

        let inputs = ColumnScale::fit(x);
        let target = Scale::fit(y);
        let scaled_x = inputs.apply(x);
        let scaled_y = y.mapv(|value| target.apply(value));

        let mut rng = SmallRng::seed_from_u64(seed);
        let mut sizes = vec![width];
        sizes.extend(params.hidden_layers.iter().copied().filter(|size| *size > 0));
        sizes.push(1);
        let mut layers: Vec<Dense> = sizes
            .windows(2)
            .map(|pair| Dense::new(pair[0], pair[1], &mut rng))
            .collect();
        let mut moments: Vec<Moments> = layers.iter().map(Moments::zeros).collect();

        let batch_size = params.batch_size.max(1);
        let mut order: Vec<usize> = (0..rows).collect();
        let mut step = 0;

        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let batch_x = scaled_x.select(Axis(0), batch);
                let batch_y = scaled_y.select(Axis(0), batch).insert_axis(Axis(1));
                let (loss, gradients) = backpropagate(&layers, batch_x, batch_y);
                epoch_loss += loss;

                step += 1;
                for ((layer, moment), (grad_w, grad_b)) in
                    layers.iter_mut().zip(&mut moments).zip(gradients)
                {
                    adam_step(
                        &mut layer.weights,
                        &grad_w,
                        &mut moment.weights_m,
                        &mut moment.weights_v,
                        params.learning_rate,
                        step,
                    );
                    adam_step(
                        &mut layer.biases,
                        &grad_b,
                        &mut moment.biases_m,
                        &mut moment.biases_v,
                        params.learning_rate,
                        step,
                    );
                }
            }

            if !epoch_loss.is_finite() {
                return Err(FitError::NumericalInstability(format!(
                    "training loss diverged in epoch {epoch}"
                )));
            }
        }

        Ok(Self {
            layers,
            inputs,
            target,
        })
    }
}

/// Batch-averaged gradients of the half squared error, one `(weights, biases)` pair per
/// layer, plus the summed batch loss.
fn backpropagate(
    layers: &[Dense],
    input: Array2<f64>,
    target: Array2<f64>,
) -> (f64, Vec<(Array2<f64>, Array1<f64>)>) {
    let last = layers.len() - 1;
    let batch = input.nrows() as f64;
    let mut activations = vec![input];
    for (idx, layer) in layers.iter().enumerate() {
        let next = layer.forward(activations[idx].view(), idx != last);
        activations.push(next);
    }

    let mut delta = &activations[layers.len()] - &target;
    let loss = 0.5 * delta.mapv(|error| error * error).sum();

    let mut gradients = Vec::with_capacity(layers.len());
    for idx in (0..layers.len()).rev() {
        let layer_input = &activations[idx];
        let grad_w = layer_input.t().dot(&delta) / batch;
        let grad_b = delta.sum_axis(Axis(0)) / batch;

        if idx > 0 {
            let mut upstream = delta.dot(&layers[idx].weights.t());
            Zip::from(&mut upstream)
                .and(layer_input)
                .for_each(|grad, &activation| {
                    if activation <= 0.0 {
                        *grad = 0.0;
                    }
                });
            delta = upstream;
        }
        gradients.push((grad_w, grad_b));
    }
    gradients.reverse();

    (loss, gradients)
}

impl Regressor for NeuralNetwork {
    fn predict(&self, features: ArrayView1<'_, f64>) -> f64 {
        let last = self.layers.len() - 1;
        let mut activation = self.inputs.apply(features.insert_axis(Axis(0)));
        for (idx, layer) in self.layers.iter().enumerate() {
            activation = layer.forward(activation.view(), idx != last);
        }
        self.target.invert(activation[[0, 0]])
    }
}
