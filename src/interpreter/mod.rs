//! The interpreter: expansion, evaluation, builtins, and real process
//! execution, all sharing one [`state::ShellState`] threaded by
//! reference.

pub mod arith_eval;
pub mod builtins;
pub mod errors;
pub mod evaluator;
pub mod expand;
pub mod flow;
pub mod pattern;
pub mod process;
pub mod redirect;
pub mod state;
pub mod suggest;

pub use errors::ShellError;
pub use evaluator::Evaluator;
pub use flow::Flow;
pub use state::{Limits, ShellState};
