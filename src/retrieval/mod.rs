pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod vector;

pub use chunker::{Chunk, chunk_document, split_text};
pub use embeddings::{EmbeddingProvider, OpenAiEmbedding};
pub use index::{DocumentIndex, IndexParams, Passage};
pub use vector::cosine_similarity;
