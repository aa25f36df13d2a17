//! Built-in module library.
//!
//! Each submodule holds the implementations of one module kind.
//! [`BuiltinModules`] is the plugin provider that registers all of them.

use crate::errors::Result;
use crate::pipeline::registry::{AnyFactory, PluginProvider, RegistryBuilder};

/// Implement [`Module`](crate::pipeline::traits::Module) for a struct with a
/// `params: ParameterSet` field and a [`Described`](crate::pipeline::traits::Described) impl.
macro_rules! impl_module {
    ($ty:ty) => {
        impl_module!($ty, $crate::pipeline::traits::ExecutionMode::WholeBatch);
    };
    ($ty:ty, $mode:expr) => {
        impl $crate::pipeline::traits::Module for $ty {
            fn display_name(&self) -> &'static str {
                <Self as $crate::pipeline::traits::Described>::NAME
            }

            fn description(&self) -> &'static str {
                <Self as $crate::pipeline::traits::Described>::DESCRIPTION
            }

            fn params(&self) -> &$crate::pipeline::params::ParameterSet {
                &self.params
            }

            fn params_mut(&mut self) -> &mut $crate::pipeline::params::ParameterSet {
                &mut self.params
            }

            fn execution_mode(&self) -> $crate::pipeline::traits::ExecutionMode {
                $mode
            }
        }
    };
}

pub mod analysis;
pub mod canonicizers;
pub mod distances;
pub mod embeddings;
pub mod event_culling;
pub mod event_drivers;

/// Registers every module shipped with the crate.
pub struct BuiltinModules;

impl PluginProvider for BuiltinModules {
    fn name(&self) -> &str {
        "builtin"
    }

    fn register(&self, r: &mut RegistryBuilder) -> Result<()> {
        use analysis::*;
        use canonicizers::*;
        use distances::*;
        use embeddings::*;
        use event_culling::*;
        use event_drivers::*;

        r.register(AnyFactory::canonicizer::<NormalizeWhitespace>())?;
        r.register(AnyFactory::canonicizer::<UnifyCase>())?;
        r.register(AnyFactory::canonicizer::<StripPunctuation>())?;
        r.register(AnyFactory::canonicizer::<StripNumbers>())?;
        r.register(AnyFactory::canonicizer::<PunctuationSeparator>())?;
        r.register(AnyFactory::canonicizer::<StripAlphanumeric>())?;
        r.register(AnyFactory::canonicizer::<StripNullCharacters>())?;

        r.register(AnyFactory::event_driver::<CharacterNGrams>())?;
        r.register(AnyFactory::event_driver::<WhitespaceWords>())?;
        r.register(AnyFactory::event_driver::<Words>())?;
        r.register(AnyFactory::event_driver::<Sentences>())?;
        r.register(AnyFactory::event_driver::<WordNGrams>())?;
        r.register(AnyFactory::event_driver::<KSkipCharacterNGrams>())?;
        r.register(AnyFactory::event_driver::<CharacterPosition>())?;

        r.register(AnyFactory::event_culling::<NOccurrences>())?;
        r.register(AnyFactory::event_culling::<MostCommonEvents>())?;
        r.register(AnyFactory::event_culling::<LeastCommonEvents>())?;
        r.register(AnyFactory::event_culling::<ExtremeCuller>())?;

        r.register(AnyFactory::embedding::<Frequency>())?;

        r.register(AnyFactory::analysis_method::<CentroidDriver>())?;
        r.register(AnyFactory::analysis_method::<KNearestNeighbors>())?;
        r.register(AnyFactory::analysis_method::<CrossEntropy>())?;

        r.register(AnyFactory::distance_function::<EuclideanDistance>())?;
        r.register(AnyFactory::distance_function::<CosineDistance>())?;
        r.register(AnyFactory::distance_function::<ManhattanDistance>())?;
        Ok(())
    }
}
