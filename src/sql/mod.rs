//! Query compiler: identifiers from config only, values as parameters.

mod builder;
pub mod condition;
pub mod hydrate;
pub mod mutation;
pub mod operator;
pub mod params;
pub mod populate;
pub mod select;

pub use builder::*;
pub use condition::{Predicate, Scope};
pub use operator::{Operand, Operator};
pub use params::*;
pub use populate::{JoinMethod, JoinShape, JoinType, ResolvedJoin};
pub use select::{SelectPlan, SelectedColumn, Window};
