pub mod amount;
pub mod clock;
pub mod csv;
pub mod engine;
pub mod fare;
pub mod model;

pub use amount::Amount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineError, ErrorKind};
pub use fare::FareTable;
pub use model::{CardCategory, CardId, Command, NewCard, Station};
