//! Command implementations.

pub mod reset;
pub mod run;
pub mod status;

pub use self::reset::execute_reset;
pub use self::run::execute_run;
pub use self::status::execute_status;
