pub mod chunk;
pub mod embed;
pub mod error;
pub mod retriever;
pub mod types;

pub use retriever::{InMemoryRetriever, Retriever, UnavailableRetriever};
pub use types::{KnowledgeChunk, RetrievedChunk};
