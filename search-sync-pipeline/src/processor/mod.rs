//! Processor module for the search sync pipeline.
//!
//! Extracts the business document and primary key from change events.

mod document_extractor;

pub use document_extractor::{DocumentExtractor, ExtractedRecord};
