pub mod interpreter;
pub mod protocol;
pub mod session;

pub use interpreter::{ExtractionInterpreter, Interpretation};
pub use session::{ExtractionSession, ExtractionSessionController, SessionObserver};
