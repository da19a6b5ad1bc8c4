//! Input discovery, bounded chunk reading, and columnar artifact I/O.

pub mod artifact;
pub mod chunks;
pub mod discovery;
pub mod error;
pub mod scratch;
pub mod unify;

pub use artifact::{
    ArtifactWriter, backup_existing, read_parquet, replace_artifact, retire_artifact, write_parquet,
};
pub use chunks::{ChunkReader, ReadSummary};
pub use discovery::{InputFormat, list_input_files};
pub use error::{IngestError, Result};
pub use scratch::ScratchArea;
pub use unify::conform_to_columns;
