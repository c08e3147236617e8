pub mod dep;
pub mod eval;
pub mod exec;
pub mod expr;
pub mod find;
pub mod flags;
pub mod func;
pub mod loc;
pub mod ninja_emit;
pub mod progress;
pub mod rule;
pub mod stamp;
pub mod stmt;
pub mod symtab;
pub mod var;
pub mod world;

// Re-exports for convenience
pub use dep::{DepGraph, DepId, GraphBuilder};
pub use eval::{EvalIo, Evaluator, FindEmulatingEvalIo, OsEvalIo};
pub use exec::{ExecConfig, Executor};
pub use flags::Flags;
pub use world::{LocalWorld, World};
