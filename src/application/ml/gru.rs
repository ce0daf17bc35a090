//! Recurrent encoder building blocks: a GRU cell and a causal
//! convolution front end.
//!
//! Weights are drawn once from a seeded uniform initialisation and never
//! updated; only the read-out on top of the final hidden state is trained.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::Rng;

fn uniform_matrix<R: Rng>(rng: &mut R, shape: (usize, usize), limit: f64) -> Array2<f64> {
    Array2::from_shape_fn(shape, |_| rng.random_range(-limit..limit))
}

/// Glorot-style bound for a layer with the given fan in/out
fn glorot_limit(fan_in: usize, fan_out: usize) -> f64 {
    (6.0 / (fan_in + fan_out).max(1) as f64).sqrt()
}

pub fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Gated recurrent unit with update and reset gates
#[derive(Debug, Clone)]
pub struct GruCell {
    pub input_size: usize,
    pub hidden_size: usize,

    // update gate
    w_iz: Array2<f64>,
    w_hz: Array2<f64>,
    b_z: Array1<f64>,

    // reset gate
    w_ir: Array2<f64>,
    w_hr: Array2<f64>,
    b_r: Array1<f64>,

    // candidate state
    w_in: Array2<f64>,
    w_hn: Array2<f64>,
    b_n: Array1<f64>,
}

impl GruCell {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let input_limit = glorot_limit(input_size, hidden_size);
        let hidden_limit = (1.0 / hidden_size.max(1) as f64).sqrt();

        Self {
            input_size,
            hidden_size,
            w_iz: uniform_matrix(rng, (hidden_size, input_size), input_limit),
            w_hz: uniform_matrix(rng, (hidden_size, hidden_size), hidden_limit),
            b_z: Array1::zeros(hidden_size),
            w_ir: uniform_matrix(rng, (hidden_size, input_size), input_limit),
            w_hr: uniform_matrix(rng, (hidden_size, hidden_size), hidden_limit),
            b_r: Array1::zeros(hidden_size),
            w_in: uniform_matrix(rng, (hidden_size, input_size), input_limit),
            w_hn: uniform_matrix(rng, (hidden_size, hidden_size), hidden_limit),
            b_n: Array1::zeros(hidden_size),
        }
    }

    /// One time step: `h = (1 - z) * n + z * h_prev`
    pub fn forward(&self, x: ArrayView1<'_, f64>, h_prev: &Array1<f64>) -> Array1<f64> {
        let z = (self.w_iz.dot(&x) + self.w_hz.dot(h_prev) + &self.b_z).mapv(sigmoid);
        let r = (self.w_ir.dot(&x) + self.w_hr.dot(h_prev) + &self.b_r).mapv(sigmoid);
        let n = (self.w_in.dot(&x) + self.w_hn.dot(&(&r * h_prev)) + &self.b_n).mapv(f64::tanh);

        let one_minus_z = z.mapv(|v| 1.0 - v);
        &one_minus_z * &n + &z * h_prev
    }

    pub fn init_hidden(&self) -> Array1<f64> {
        Array1::zeros(self.hidden_size)
    }
}

/// Causal 1-D convolution + ReLU, followed by max pooling of size 2.
///
/// Output step `t` only sees input steps `t - kernel + 1 ..= t` (zero padded
/// on the left), so a window of length `L` yields `ceil(L / 2)` steps.
#[derive(Debug, Clone)]
pub struct ConvFrontEnd {
    pub filters: usize,
    pub kernel: usize,
    /// `[filters, kernel, in_channels]`
    weights: Array3<f64>,
    bias: Array1<f64>,
}

impl ConvFrontEnd {
    pub const POOL_SIZE: usize = 2;

    pub fn new<R: Rng>(in_channels: usize, filters: usize, kernel: usize, rng: &mut R) -> Self {
        let limit = glorot_limit(kernel * in_channels, filters);
        let weights = Array3::from_shape_fn((filters, kernel, in_channels), |_| {
            rng.random_range(-limit..limit)
        });
        Self {
            filters,
            kernel,
            weights,
            bias: Array1::zeros(filters),
        }
    }

    pub fn output_len(window_len: usize) -> usize {
        window_len.div_ceil(Self::POOL_SIZE)
    }

    /// `[L, in_channels]` -> `[ceil(L / 2), filters]`
    pub fn forward(&self, window: ArrayView2<'_, f64>) -> Array2<f64> {
        let steps = window.nrows();
        let mut conv = Array2::<f64>::zeros((steps, self.filters));

        for t in 0..steps {
            for f in 0..self.filters {
                let mut acc = self.bias[f];
                for k in 0..self.kernel {
                    // kernel tap k reads step t - (kernel - 1 - k)
                    let lag = self.kernel - 1 - k;
                    if lag > t {
                        continue;
                    }
                    let row = window.row(t - lag);
                    acc += self.weights.slice(ndarray::s![f, k, ..]).dot(&row);
                }
                conv[[t, f]] = acc.max(0.0);
            }
        }

        let pooled_len = Self::output_len(steps);
        let mut pooled = Array2::<f64>::zeros((pooled_len, self.filters));
        for (p, chunk) in conv.axis_chunks_iter(Axis(0), Self::POOL_SIZE).enumerate() {
            for f in 0..self.filters {
                pooled[[p, f]] = chunk
                    .column(f)
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
            }
        }
        pooled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_gru_cell_output_is_bounded() {
        let mut rng = StdRng::seed_from_u64(1);
        let cell = GruCell::new(4, 8, &mut rng);
        let x = Array1::from(vec![0.2, 0.9, 0.1, 0.5]);
        let mut h = cell.init_hidden();
        for _ in 0..20 {
            h = cell.forward(x.view(), &h);
        }
        assert_eq!(h.len(), 8);
        assert!(h.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = GruCell::new(3, 5, &mut StdRng::seed_from_u64(9));
        let b = GruCell::new(3, 5, &mut StdRng::seed_from_u64(9));
        let x = Array1::from(vec![0.3, 0.6, 0.9]);
        let h = a.init_hidden();
        assert_eq!(a.forward(x.view(), &h), b.forward(x.view(), &h));
    }

    #[test]
    fn test_conv_front_end_shape() {
        let mut rng = StdRng::seed_from_u64(2);
        let conv = ConvFrontEnd::new(6, 16, 2, &mut rng);
        let window = Array2::from_elem((20, 6), 0.5);
        let out = conv.forward(window.view());
        assert_eq!(out.shape(), &[10, 16]);
        assert!(out.iter().all(|v| *v >= 0.0));

        let odd = Array2::from_elem((5, 6), 0.5);
        assert_eq!(conv.forward(odd.view()).nrows(), 3);
    }

    #[test]
    fn test_conv_is_causal() {
        let mut rng = StdRng::seed_from_u64(3);
        let conv = ConvFrontEnd::new(1, 4, 2, &mut rng);
        let mut a = Array2::zeros((4, 1));
        let mut b = Array2::zeros((4, 1));
        a[[0, 0]] = 1.0;
        b[[0, 0]] = 1.0;
        // Changing the last step must not change the first pooled step
        b[[3, 0]] = 5.0;
        let out_a = conv.forward(a.view());
        let out_b = conv.forward(b.view());
        assert_eq!(out_a.row(0), out_b.row(0));
    }
}
