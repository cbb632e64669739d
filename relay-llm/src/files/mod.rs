pub mod client;
pub mod types;


pub use types::{
    FileError, FileObject, FilePurpose, ListResponse, VectorStore, VectorStoreFile,
    VectorStoreFileStatus,
};
