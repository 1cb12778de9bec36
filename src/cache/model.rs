//! Loaded model instances and their optional memory-saving capabilities.

use std::any::Any;
use std::fmt;

/// Memory-saving toggles a model backend may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    MemoryEfficientAttention,
    AttentionSlicing,
    VaeSlicing,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::MemoryEfficientAttention,
        Capability::AttentionSlicing,
        Capability::VaeSlicing,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::MemoryEfficientAttention => write!(f, "memory-efficient attention"),
            Capability::AttentionSlicing => write!(f, "attention slicing"),
            Capability::VaeSlicing => write!(f, "VAE slicing"),
        }
    }
}

/// A model instance resident in the loaded-models table.
///
/// Only `name` and the downcast hooks are required. The capability methods
/// default to "not supported"; a backend opts in by overriding the matching
/// `supports_*` / `enable_*` pair.
pub trait Model: Any + Send {
    fn name(&self) -> &str;

    fn supports_memory_efficient_attention(&self) -> bool {
        false
    }

    fn enable_memory_efficient_attention(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("memory-efficient attention not supported by {}", self.name())
    }

    fn supports_attention_slicing(&self) -> bool {
        false
    }

    /// `slice_size` of 1 trades the most speed for the least memory.
    fn enable_attention_slicing(&mut self, _slice_size: u32) -> anyhow::Result<()> {
        anyhow::bail!("attention slicing not supported by {}", self.name())
    }

    fn supports_vae_slicing(&self) -> bool {
        false
    }

    fn enable_vae_slicing(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("VAE slicing not supported by {}", self.name())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Model {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::MemoryEfficientAttention => self.supports_memory_efficient_attention(),
            Capability::AttentionSlicing => self.supports_attention_slicing(),
            Capability::VaeSlicing => self.supports_vae_slicing(),
        }
    }

    pub fn enable(&mut self, capability: Capability) -> anyhow::Result<()> {
        match capability {
            Capability::MemoryEfficientAttention => self.enable_memory_efficient_attention(),
            Capability::AttentionSlicing => self.enable_attention_slicing(1),
            Capability::VaeSlicing => self.enable_vae_slicing(),
        }
    }

    pub fn downcast_ref<T: Model>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Model>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl fmt::Debug for dyn Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model").field("name", &self.name()).finish()
    }
}
