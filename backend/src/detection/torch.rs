use std::sync::{Arc, Mutex};

use log::info;
use tch::{CModule, Device, Kind, Tensor};

use super::yolo::YoloEngine;
use crate::error::InferenceError;

/// TorchScript export of the detector network.
#[derive(Clone)]
pub struct TorchEngine {
    model: Arc<Mutex<CModule>>,
    device: Device,
}

impl TorchEngine {
    pub fn load(model_path: &str) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(model_path, device).map_err(|e| InferenceError::Load {
            path: model_path.to_string(),
            reason: e.to_string(),
        })?;
        info!("Loaded TorchScript detector from {} on {:?}", model_path, device);
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            device,
        })
    }
}

impl YoloEngine for TorchEngine {
    fn forward(
        &self,
        input: Vec<f32>,
        size: u32,
    ) -> Result<(Vec<f32>, (usize, usize)), InferenceError> {
        let side = size as i64;
        let tensor = Tensor::from_slice(&input)
            .view([1, 3, side, side])
            .to_device(self.device);

        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Backend("detector lock poisoned".into()))?;
            tch::no_grad(|| model.forward_ts(&[tensor]))?
        };

        // [1, 4 + classes, candidates] -> [4 + classes, candidates]
        let output = output.squeeze_dim(0).to_kind(Kind::Float).to_device(Device::Cpu);
        let dims = output.size();
        if dims.len() != 2 {
            return Err(InferenceError::Backend(format!(
                "unexpected detector output dimensions {:?}",
                dims
            )));
        }
        let shape = (dims[0] as usize, dims[1] as usize);

        let flat = output.contiguous().view([-1]);
        let num_elements = flat.size()[0] as usize;
        let mut data = vec![0.0f32; num_elements];
        flat.copy_data(&mut data, num_elements);
        Ok((data, shape))
    }
}
