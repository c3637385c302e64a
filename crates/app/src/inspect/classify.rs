//! Classification capability consumed by the inference producer.
//!
//! The producer only depends on the [`Classifier`] trait; the model-backed
//! implementation is gated behind `with-tch` so the node builds without the
//! libtorch toolchain.

use anyhow::Result;
use frame_ingest::Frame;

/// Number of defect classes the model emits. Label 0 means "no defect",
/// labels 1..N are defect codes.
pub const DEFECT_CLASS_COUNT: i64 = 10;

/// Model input edge length in pixels; frames are captured at this size.
pub const MODEL_EDGE_PIXELS: i64 = 28;

/// Maps one captured frame to a defect label in `[0, DEFECT_CLASS_COUNT)`.
pub trait Classifier: Send {
    fn classify(&self, frame: &Frame) -> Result<i64>;
}

#[cfg(feature = "with-tch")]
pub use model::ModelClassifier;

#[cfg(feature = "with-tch")]
mod model {
    use std::path::Path;

    use anyhow::{Context, Result, bail};
    use frame_ingest::Frame;
    use tch::{
        Device, Kind, Tensor,
        nn::{self, ModuleT},
    };

    use super::{Classifier, DEFECT_CLASS_COUNT, MODEL_EDGE_PIXELS};

    /// Quantised defect classifier loaded from a saved VarStore.
    pub struct ModelClassifier {
        _vs: nn::VarStore,
        net: DefectNet,
        device: Device,
    }

    impl ModelClassifier {
        pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
            let device = Device::cuda_if_available();
            let mut vs = nn::VarStore::new(device);
            let net = DefectNet::new(&vs.root());
            vs.load(model_path.as_ref()).with_context(|| {
                format!("failed to load model from {}", model_path.as_ref().display())
            })?;
            Ok(Self {
                _vs: vs,
                net,
                device,
            })
        }
    }

    impl Classifier for ModelClassifier {
        fn classify(&self, frame: &Frame) -> Result<i64> {
            let expected = (MODEL_EDGE_PIXELS * MODEL_EDGE_PIXELS) as usize;
            if frame.data.len() != expected {
                bail!(
                    "frame is {}x{}, expected {MODEL_EDGE_PIXELS}x{MODEL_EDGE_PIXELS}",
                    frame.width,
                    frame.height
                );
            }

            let pixels: Vec<f32> = frame.data.iter().map(|&p| p as f32 / 255.0).collect();
            let input = Tensor::from_slice(&pixels)
                .to_device(self.device)
                .view([1, MODEL_EDGE_PIXELS * MODEL_EDGE_PIXELS]);

            let logits = self.net.forward_t(&input, false);
            let label = logits.argmax(-1, false).int64_value(&[0]);
            Ok(label)
        }
    }

    #[derive(Debug)]
    struct DefectNet {
        fc1: nn::Linear,
        fc2: nn::Linear,
    }

    impl DefectNet {
        fn new(vs: &nn::Path) -> Self {
            let fc1 = nn::linear(
                vs / "fc1",
                MODEL_EDGE_PIXELS * MODEL_EDGE_PIXELS,
                128,
                Default::default(),
            );
            let fc2 = nn::linear(vs / "fc2", 128, DEFECT_CLASS_COUNT, Default::default());
            Self { fc1, fc2 }
        }
    }

    impl ModuleT for DefectNet {
        fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
            xs.apply(&self.fc1).relu().dropout(0.2, train).apply(&self.fc2)
        }
    }
}
