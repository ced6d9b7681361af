//! Feed-forward bound estimator trained with Adam.
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use super::{BatchSource, BoundEstimator, StepTarget, TrainingReport};
use crate::{
    magic::{ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON, LEAKY_RELU_SLOPE},
    sampling::sampling_rng,
    utils::{conf::EstimatorConf, error::ReachResult},
};

fn leaky(z: f64) -> f64 {
    if z > 0.0 { z } else { LEAKY_RELU_SLOPE * z }
}

fn leaky_slope(z: f64) -> f64 {
    if z > 0.0 { 1.0 } else { LEAKY_RELU_SLOPE }
}

/// Standard normal draw (Box-Muller).
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[derive(Debug, Clone)]
struct Dense {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl Dense {
    /// He-normal weights, zero bias.
    fn he_normal<R: Rng>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let std = (2.0 / inputs as f64).sqrt();
        Self {
            weights: DMatrix::from_fn(outputs, inputs, |_, _| std * standard_normal(rng)),
            bias: DVector::zeros(outputs),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            weights: DMatrix::zeros(self.weights.nrows(), self.weights.ncols()),
            bias: DVector::zeros(self.bias.len()),
        }
    }
}

/// Pre-activations of every layer for one input.
struct Trace {
    inputs: Vec<DVector<f64>>,
    pre: Vec<DVector<f64>>,
}

/// Adam moments for every parameter of the network.
#[derive(Debug, Clone)]
struct Adam {
    first: Vec<Dense>,
    second: Vec<Dense>,
    steps: i32,
}

impl Adam {
    fn new(layers: &[Dense]) -> Self {
        Self {
            first: layers.iter().map(Dense::zeros_like).collect(),
            second: layers.iter().map(Dense::zeros_like).collect(),
            steps: 0,
        }
    }

    fn step(&mut self, layers: &mut [Dense], grads: &[Dense], lr: f64, weight_decay: f64) {
        self.steps += 1;
        let c1 = 1.0 - ADAM_BETA1.powi(self.steps);
        let c2 = 1.0 - ADAM_BETA2.powi(self.steps);
        let update = |param: &mut f64, grad: f64, m: &mut f64, v: &mut f64| {
            let grad = grad + weight_decay * *param;
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * grad;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * grad * grad;
            *param -= lr * (*m / c1) / ((*v / c2).sqrt() + ADAM_EPSILON);
        };

        for (l, layer) in layers.iter_mut().enumerate() {
            let (m, v) = (&mut self.first[l], &mut self.second[l]);
            for k in 0..layer.weights.len() {
                update(&mut layer.weights[k], grads[l].weights[k], &mut m.weights[k], &mut v.weights[k]);
            }
            for k in 0..layer.bias.len() {
                update(&mut layer.bias[k], grads[l].bias[k], &mut m.bias[k], &mut v.bias[k]);
            }
        }
    }
}

/// `1 → H → H → H → 1` perceptron with LeakyReLU after every layer.
#[derive(Debug, Clone)]
pub struct MlpEstimator {
    layers: Vec<Dense>,
    adam: Adam,
    learning_rate: f64,
    weight_decay: f64,
    lr_decay: f64,
    epochs: usize,
    violation_weight: f64,
}

impl MlpEstimator {
    /// Network initialised from `seed`, or from the thread generator when unseeded.
    pub fn from_conf(conf: &EstimatorConf, seed: Option<u64>) -> Self {
        let mut rng = sampling_rng(seed);
        let h = conf.hidden;
        let layers = vec![
            Dense::he_normal(1, h, &mut rng),
            Dense::he_normal(h, h, &mut rng),
            Dense::he_normal(h, h, &mut rng),
            Dense::he_normal(h, 1, &mut rng),
        ];
        Self {
            adam: Adam::new(&layers),
            layers,
            learning_rate: conf.learning_rate,
            weight_decay: conf.weight_decay,
            lr_decay: conf.lr_decay,
            epochs: conf.epochs,
            violation_weight: conf.violation_weight,
        }
    }

    /// Current learning rate, after the decay of completed epochs.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn forward(&self, t: f64) -> (f64, Trace) {
        let mut x = DVector::from_element(1, t);
        let mut trace = Trace {
            inputs: Vec::with_capacity(self.layers.len()),
            pre: Vec::with_capacity(self.layers.len()),
        };
        for layer in &self.layers {
            let z = &layer.weights * &x + &layer.bias;
            let next = z.map(leaky);
            trace.inputs.push(std::mem::replace(&mut x, next));
            trace.pre.push(z);
        }
        (x[0], trace)
    }

    /// Accumulate `d_out · ∂out/∂θ` into `grads`.
    fn backward(&self, trace: &Trace, d_out: f64, grads: &mut [Dense]) {
        let mut upstream = DVector::from_element(1, d_out);
        for (l, layer) in self.layers.iter().enumerate().rev() {
            let dz = upstream.component_mul(&trace.pre[l].map(leaky_slope));
            grads[l].weights += &dz * trace.inputs[l].transpose();
            grads[l].bias += &dz;
            upstream = layer.weights.tr_mul(&dz);
        }
    }

    /// Loss of one step and its derivative with respect to `mu`.
    ///
    /// The `log1p(mu)` size term only applies for `mu > 0`; it is undefined for
    /// `mu ≤ -1`, and a non-positive bound should be pushed up by the violation
    /// term alone. That term is the mean `‖relu(v − mu·g)‖₂` scaled by the
    /// violation weight.
    fn step_loss(&self, mu: f64, g: &DVector<f64>, coords: &[DVector<f64>]) -> (f64, f64) {
        let (mut loss, mut d_mu) = if mu > 0.0 { (mu.ln_1p(), 1.0 / (1.0 + mu)) } else { (0.0, 0.0) };
        let weight = self.violation_weight / coords.len() as f64;
        for v in coords {
            let excess = (v - g * mu).map(|e| e.max(0.0));
            let norm = excess.norm();
            if norm > 0.0 {
                loss += weight * norm;
                d_mu -= weight * excess.dot(g) / norm;
            }
        }
        (loss, d_mu)
    }
}

impl BoundEstimator for MlpEstimator {
    fn train(&mut self, c: &DMatrix<f64>, g: &DVector<f64>, batches: &mut dyn BatchSource) -> ReachResult<TrainingReport> {
        let mut report = TrainingReport::default();
        for epoch in 0..self.epochs {
            let targets = batches
                .next_batch()?
                .iter()
                .map(|cloud| StepTarget::from_cloud(c, cloud))
                .collect::<ReachResult<Vec<_>>>()?;
            if targets.is_empty() {
                continue;
            }

            let mut grads: Vec<Dense> = self.layers.iter().map(Dense::zeros_like).collect();
            let mut loss = 0.0;
            let scale = 1.0 / targets.len() as f64;
            for target in &targets {
                let (mu, trace) = self.forward(target.time);
                let (step_loss, d_mu) = self.step_loss(mu, g, &target.coords);
                loss += scale * step_loss;
                self.backward(&trace, scale * d_mu, &mut grads);
            }

            self.adam.step(&mut self.layers, &grads, self.learning_rate, self.weight_decay);
            self.learning_rate *= self.lr_decay;
            trace!("Epoch {} over {} steps: loss {}", epoch, targets.len(), loss);
            report.losses.push(loss);
            report.epochs += 1;
        }
        debug!("Trained bound estimator for {} epochs, final loss {:?}", report.epochs, report.final_loss());
        Ok(report)
    }

    fn predict(&self, t: f64) -> f64 {
        self.forward(t).0.max(0.0)
    }
}
