// Compilation dispatch: derives units from the run configuration, schedules them
// onto worker threads and aggregates their terminal states.

pub mod cancel;
pub mod dispatcher;
pub mod result;
pub mod unit;

pub use dispatcher::Dispatcher;
pub use result::EXIT_STARTUP;
