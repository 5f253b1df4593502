pub mod geometry;
pub mod record;
pub mod warning;

pub use geometry::{Geometry, GeometryError, Position, RawGeometry};
pub use record::{WarningRecord, WarningStatus};
pub use warning::RawWarning;
