//! Bar source port trait.

use crate::domain::bar::Bar;
use crate::domain::error::LookbackError;

/// Supplies bars ascending by `ending` with no duplicates.
pub trait BarPort {
    fn load_bars(&self) -> Result<Vec<Bar>, LookbackError>;
}
