//! Figma REST API client

pub mod client;
pub mod errors;
pub mod types;

pub use client::{FigmaClient, FigmaTransport, FIGMA_API_URL};
pub use errors::FigmaError;
pub use types::*;
