pub mod cell;
pub mod options;
pub mod relation;
pub mod semantic;

pub use cell::{Cell, cells_to_series, column_cells};
pub use options::{AggregateOptions, AggregationStrategy, CopyOptions};
pub use relation::{ColumnDef, ForeignKey, Predicate, Projection, RelationSchema, RelationSource, Shape};
pub use semantic::SemanticType;
