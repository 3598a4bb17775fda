//! Execution strategies and their dispatch table.
//!
//! The four strategies are a closed set: each one maps, through [`ExecutionStrategy::recipe`], to
//! the kernel entry point to build, the memory space holding the per-work-item distribution
//! object, and the call style used to reach the distribution's sampling routine.

use crate::kernels::device::{
    DeviceKernel, CL_SAMPLE_GLOBAL_SCRATCH, CL_SAMPLE_LOCAL_SCRATCH, CL_SAMPLE_STATIC,
    CL_SAMPLE_WITH_OBJECT,
};

use std::fmt;

/// Strategy used to invoke the benchmarked distribution on the device.
///
/// The declaration order is the tie-break order of the benchmark verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum ExecutionStrategy {
    /// Distribution object built in private memory, sampled through its method.
    ObjectDispatch,
    /// Static quantile function called directly with the rate.
    StaticDispatch,
    /// Distribution object stored in global memory.
    GlobalMemoryScratch,
    /// Distribution object stored in local memory.
    LocalMemoryScratch,
}

/// Memory space holding the per-work-item distribution object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScratchSpace {
    Private,
    Local,
    Global,
}

/// How the kernel reaches the distribution's sampling routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallStyle {
    Object,
    Static,
}

/// How the secondary count `n1` of a parameter set is consumed by a strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SecondaryPolicy {
    /// Each work-item draws `max(n1, 1)` variates from its own stream (1-D launch).
    #[default]
    Iterations,
    /// `max(n1, 1)` host-generated variates are staged in a second buffer (2-D launch).
    VariateBuffer,
}

/// Everything needed to build and launch the kernel of a strategy.
#[derive(Clone, Copy, Debug)]
pub struct KernelRecipe {
    pub kernel: &'static DeviceKernel,
    pub scratch: ScratchSpace,
    pub call: CallStyle,
}

impl ExecutionStrategy {
    /// All strategies, in tie-break order.
    pub const ALL: [Self; 4] = [
        Self::ObjectDispatch,
        Self::StaticDispatch,
        Self::GlobalMemoryScratch,
        Self::LocalMemoryScratch,
    ];

    /// Dispatch table entry of the strategy.
    pub fn recipe(self) -> KernelRecipe {
        match self {
            Self::ObjectDispatch => KernelRecipe {
                kernel: &CL_SAMPLE_WITH_OBJECT,
                scratch: ScratchSpace::Private,
                call: CallStyle::Object,
            },
            Self::StaticDispatch => KernelRecipe {
                kernel: &CL_SAMPLE_STATIC,
                scratch: ScratchSpace::Private,
                call: CallStyle::Static,
            },
            Self::GlobalMemoryScratch => KernelRecipe {
                kernel: &CL_SAMPLE_GLOBAL_SCRATCH,
                scratch: ScratchSpace::Global,
                call: CallStyle::Object,
            },
            Self::LocalMemoryScratch => KernelRecipe {
                kernel: &CL_SAMPLE_LOCAL_SCRATCH,
                scratch: ScratchSpace::Local,
                call: CallStyle::Object,
            },
        }
    }

    /// Stable numeric identifier, starting at 1.
    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    /// Decodes a numeric identifier.
    ///
    /// # Panics
    /// Panics if `id` does not name a strategy: ids only ever come from [`Self::id`].
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Self::ObjectDispatch,
            2 => Self::StaticDispatch,
            3 => Self::GlobalMemoryScratch,
            4 => Self::LocalMemoryScratch,
            _ => panic!("unknown execution strategy id {id}"),
        }
    }

    /// Position of the strategy in [`Self::ALL`].
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectDispatch => write!(f, "object dispatch"),
            Self::StaticDispatch => write!(f, "static dispatch"),
            Self::GlobalMemoryScratch => write!(f, "global memory scratch"),
            Self::LocalMemoryScratch => write!(f, "local memory scratch"),
        }
    }
}

/// Secondary policy of each strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SecondaryPolicies([SecondaryPolicy; 4]);

impl SecondaryPolicies {
    /// Same policy for every strategy.
    pub fn uniform(policy: SecondaryPolicy) -> Self {
        Self([policy; 4])
    }

    /// Overrides the policy of one strategy.
    pub fn with(mut self, strategy: ExecutionStrategy, policy: SecondaryPolicy) -> Self {
        self.0[strategy.index()] = policy;
        self
    }

    pub fn get(&self, strategy: ExecutionStrategy) -> SecondaryPolicy {
        self.0[strategy.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_table_is_total_and_distinct() {
        let names: Vec<_> = ExecutionStrategy::ALL
            .iter()
            .map(|s| s.recipe().kernel.name())
            .collect();
        assert_eq!(
            names,
            [
                "sample_with_object",
                "sample_static",
                "sample_global_scratch",
                "sample_local_scratch"
            ]
        );
    }

    #[test]
    fn strategies_split_along_two_axes() {
        use ExecutionStrategy::*;
        assert_eq!(ObjectDispatch.recipe().call, CallStyle::Object);
        assert_eq!(StaticDispatch.recipe().call, CallStyle::Static);
        assert_eq!(GlobalMemoryScratch.recipe().scratch, ScratchSpace::Global);
        assert_eq!(LocalMemoryScratch.recipe().scratch, ScratchSpace::Local);
        assert_eq!(ObjectDispatch.recipe().scratch, ScratchSpace::Private);
    }

    #[test]
    fn ids_round_trip_in_declaration_order() {
        for (i, strategy) in ExecutionStrategy::ALL.into_iter().enumerate() {
            assert_eq!(strategy.id() as usize, i + 1);
            assert_eq!(ExecutionStrategy::from_id(strategy.id()), strategy);
        }
        assert!(ExecutionStrategy::ObjectDispatch < ExecutionStrategy::StaticDispatch);
    }

    #[test]
    #[should_panic(expected = "unknown execution strategy id")]
    fn unknown_id_fails_fast() {
        ExecutionStrategy::from_id(5);
    }

    #[test]
    fn policies_can_be_overridden_per_strategy() {
        let policies = SecondaryPolicies::default().with(
            ExecutionStrategy::GlobalMemoryScratch,
            SecondaryPolicy::VariateBuffer,
        );
        assert_eq!(
            policies.get(ExecutionStrategy::GlobalMemoryScratch),
            SecondaryPolicy::VariateBuffer
        );
        assert_eq!(
            policies.get(ExecutionStrategy::ObjectDispatch),
            SecondaryPolicy::Iterations
        );
    }
}
