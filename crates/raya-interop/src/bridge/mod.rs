//! Cross-runtime subclassing bridge
//!
//! - `factory` and `declaration` synthesize derived managed types from a
//!   scripting class
//! - `dispatch` holds the thunks those types install in their vtables
//! - `handle`, `lifetime` and `finalizer` keep each instance and its
//!   scripting companion alive exactly as long as either side needs them
//! - `modules` caches generation containers

mod declaration;
mod descriptor;
pub(crate) mod dispatch;
mod factory;
mod finalizer;
mod handle;
pub mod lifetime;
mod modules;

pub use declaration::{MethodExposure, PropertyExposure};
pub use descriptor::{DerivedTypeDescriptor, DerivedTypeInfo, DispatchBehavior, ExplicitMember};
pub(crate) use factory::create_derived_type;
pub use factory::{shadow_name, DerivedTypeRequest};
pub use finalizer::{DrainStats, FinalizationQueue, PendingFinalization};
pub use handle::{CompanionHandle, ReferenceState};
pub use modules::{GenerationModule, ModuleRegistry};
