//! Element-wise activations fused into convolution output.

/// Activation applied to every convolution output element after bias.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Activation {
    /// Pass values through unchanged.
    #[default]
    Identity,
    /// `max(x, 0)`.
    Relu,
    /// `x` for positive inputs, `alpha * x` otherwise.
    LeakyRelu { alpha: f32 },
    /// Clamp into `[min, max]`.
    Clip { min: f32, max: f32 },
}

impl Activation {
    /// Apply to a single value.
    #[inline(always)]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Relu => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu { alpha } => {
                if x >= 0.0 {
                    x
                } else {
                    x * alpha
                }
            }
            Activation::Clip { min, max } => x.max(min).min(max),
        }
    }

    /// Apply in place to a buffer.
    pub fn apply_slice(self, values: &mut [f32]) {
        if self == Activation::Identity {
            return;
        }
        for v in values.iter_mut() {
            *v = self.apply(*v);
        }
    }

    /// True when the activation leaves values untouched.
    #[inline]
    pub fn is_identity(&self) -> bool {
        matches!(self, Activation::Identity)
    }
}
