//! Background-removal engine implementations.

mod chroma_key;
mod rembg;

pub use chroma_key::ChromaKeyEngine;
pub use rembg::RembgEngine;
