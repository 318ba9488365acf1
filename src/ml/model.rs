// ============================================================
// Layer 5 — LSTM Sales Model
// ============================================================
// Stacked LSTM over a window of daily feature vectors:
//
//   x [batch, seq, step]
//     → LSTM 1 → dropout → LSTM 2 → ... → LSTM n
//     → last time step [batch, units]
//     → dropout → Linear(units, 1)
//     → scaled next-day sales [batch, 1]

use burn::{
    nn::{
        loss::{MseLoss, Reduction},
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        Lstm, LstmConfig,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct SalesLstmConfig {
    /// Values per time step (features + scaled sales)
    pub input_size: usize,
    pub units:      usize,
    pub layers:     usize,
    pub dropout:    f64,
}

impl SalesLstmConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SalesLstm<B> {
        let lstm_layers: Vec<Lstm<B>> = (0..self.layers.max(1))
            .map(|i| {
                let d_in = if i == 0 { self.input_size } else { self.units };
                LstmConfig::new(d_in, self.units, true).init(device)
            })
            .collect();
        let head    = LinearConfig::new(self.units, 1).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        SalesLstm { lstm_layers, head, dropout }
    }
}

#[derive(Module, Debug)]
pub struct SalesLstm<B: Backend> {
    pub lstm_layers: Vec<Lstm<B>>,
    pub head:        Linear<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> SalesLstm<B> {
    /// x: [batch, seq, input_size] → [batch, 1]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let n_layers = self.lstm_layers.len();
        let mut h = x;
        for (i, lstm) in self.lstm_layers.iter().enumerate() {
            let (out, _state) = lstm.forward(h, None);
            h = if i + 1 < n_layers { self.dropout.forward(out) } else { out };
        }

        let [batch, seq, units] = h.dims();
        let last = h.slice([0..batch, seq - 1..seq, 0..units]).reshape([batch, units]);
        self.head.forward(self.dropout.forward(last))
    }

    pub fn forward_loss(&self, x: Tensor<B, 3>, targets: Tensor<B, 2>) -> (Tensor<B, 1>, Tensor<B, 2>)
    where
        B: AutodiffBackend,
    {
        let output = self.forward(x);
        let loss = MseLoss::new().forward(output.clone(), targets, Reduction::Mean);
        (loss, output)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model: SalesLstm<NdArray> = SalesLstmConfig::new(4, 8, 2, 0.0).init(&device);
        assert_eq!(model.lstm_layers.len(), 2);

        let x = Tensor::<NdArray, 3>::zeros([3, 5, 4], &device);
        assert_eq!(model.forward(x).dims(), [3, 1]);
    }

    #[test]
    fn test_loss_is_scalar_and_differentiable() {
        type B = Autodiff<NdArray>;
        let device = Default::default();
        let model: SalesLstm<B> = SalesLstmConfig::new(3, 4, 1, 0.1).init(&device);

        let x = Tensor::<B, 3>::ones([2, 6, 3], &device);
        let y = Tensor::<B, 2>::ones([2, 1], &device);
        let (loss, out) = model.forward_loss(x, y);
        assert_eq!(loss.dims(), [1]);
        assert_eq!(out.dims(), [2, 1]);

        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        assert!(loss_val.is_finite());
        let _grads = loss.backward();
    }
}
