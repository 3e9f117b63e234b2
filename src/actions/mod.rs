//! Actions bound to keys and the machinery that runs them

mod children;
mod executor;
mod table;

pub use executor::Executor;
pub use table::{Action, ActionError, ActionTable};
