//! Optimizer implementations for zen-sage training
//!
//! Optimizers work on flat views: the caller passes every trainable scalar as
//! `&mut T` together with a gradient slice in the same order.

use num_traits::Float;

use super::ZenOptimizer;
use crate::config::AdamConfig;
use crate::errors::{GNNError, GNNResult};

/// Adam optimizer with bias correction
#[derive(Debug, Clone)]
pub struct ZenAdam<T: Float> {
    learning_rate: T,
    beta1: T,
    beta2: T,
    epsilon: T,

    // State buffers
    m_buffers: Vec<T>, // First moment
    v_buffers: Vec<T>, // Second moment
    step_count: u64,
    initialized: bool,
}

impl<T: Float + Default> ZenAdam<T> {
    pub fn new(learning_rate: T, beta1: T, beta2: T, epsilon: T) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m_buffers: Vec::new(),
            v_buffers: Vec::new(),
            step_count: 0,
            initialized: false,
        }
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }
}

impl ZenAdam<f32> {
    /// Adam from the session's learning rate and moment settings
    pub fn from_config(learning_rate: f32, config: &AdamConfig) -> Self {
        Self::new(learning_rate, config.beta1, config.beta2, config.epsilon)
    }
}

impl<T: Float + Default + Send + Sync> ZenOptimizer<T> for ZenAdam<T> {
    fn initialize(&mut self, parameter_count: usize) -> GNNResult<()> {
        self.m_buffers = vec![T::default(); parameter_count];
        self.v_buffers = vec![T::default(); parameter_count];
        self.initialized = true;
        self.step_count = 0;
        Ok(())
    }

    fn update_parameters(&mut self, parameters: Vec<&mut T>, gradients: &[T]) -> GNNResult<()> {
        if !self.initialized {
            return Err(GNNError::TrainingFailed(
                "Optimizer not initialized".to_string(),
            ));
        }

        if parameters.len() != gradients.len() || parameters.len() != self.m_buffers.len() {
            return Err(GNNError::DimensionMismatch(format!(
                "Optimizer tracks {} parameters, got {} parameters and {} gradients",
                self.m_buffers.len(),
                parameters.len(),
                gradients.len()
            )));
        }

        self.step_count += 1;

        // Bias correction terms
        let step = i32::try_from(self.step_count).unwrap_or(i32::MAX);
        let bias_correction1 = T::one() - self.beta1.powi(step);
        let bias_correction2 = T::one() - self.beta2.powi(step);

        // Corrected learning rate
        let corrected_lr = self.learning_rate * bias_correction2.sqrt() / bias_correction1;

        for (i, (param, &grad)) in parameters.into_iter().zip(gradients.iter()).enumerate() {
            self.m_buffers[i] = self.beta1 * self.m_buffers[i] + (T::one() - self.beta1) * grad;
            self.v_buffers[i] =
                self.beta2 * self.v_buffers[i] + (T::one() - self.beta2) * grad * grad;

            let update = corrected_lr * self.m_buffers[i] / (self.v_buffers[i].sqrt() + self.epsilon);
            *param = *param - update;

            if !param.is_finite() {
                return Err(GNNError::TrainingFailed(
                    "Parameter became NaN or infinite during Adam update".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        for buffer in &mut self.m_buffers {
            *buffer = T::default();
        }
        for buffer in &mut self.v_buffers {
            *buffer = T::default();
        }
        self.step_count = 0;
    }
}
