pub mod stdout;
pub mod pretty;
pub mod log;

pub use stdout::StdoutEventManager;
pub use pretty::PrettyFormatter;
pub use log::FileEventLogger;
