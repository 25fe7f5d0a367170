pub mod chunk_extractor;
