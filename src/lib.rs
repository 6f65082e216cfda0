//! Gold Pawn Valuation
//!
//! Turns a photo of gold jewelry into a loan offer:
//! - Multimodal analysis of the image into weight, purity and condition
//! - Deterministic pricing with LTV ceilings and tiered admin fees
//! - Optional reflective validation against a regulatory knowledge base
//! - Atomic hand-off of the finished estimation to persistence
//!
//! PIPELINE:
//! IMAGE → ANALYZE → PRICE → RETRIEVE → GENERATE → REFLECT → VALIDATE → COMMIT

pub mod analyzer;
pub mod api;
pub mod capability;
pub mod config;
pub mod error;
pub mod gemini;
pub mod knowledge;
pub mod models;
pub mod pipeline;
pub mod pricing;
pub mod store;
pub mod tracking;
pub mod validator;
pub mod valuation;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use pipeline::ValuationPipeline;
pub use pricing::PricingPolicy;
pub use validator::{ReflectiveValidator, ValidationVerdict};
pub use valuation::ValuationService;
