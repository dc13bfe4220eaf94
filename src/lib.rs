pub mod blob;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod thumbnail;
pub mod transcode;
pub mod validate;

pub use blob::{Blob, BlobHandle};
pub use error::AppError;
pub use pipeline::{Pipeline, PipelineConfig};
pub use record::{RecordId, RecordStatus, SourceFile, VideoRecord};
