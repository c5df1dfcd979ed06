// UPLC crate: the untyped bytecode surface, its binary codec, and the
// metered call-by-need evaluator.
pub mod builtin;
pub mod cost;
pub mod flat;
pub mod machine;
pub mod term;

pub use builtin::Builtin;
pub use cost::{CostModel, ExBudget, Meter};
pub use machine::{run, Outcome, RunResult};
pub use term::{Const, ConstType, Program, Site, Term, TermKind};
