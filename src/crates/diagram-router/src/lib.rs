//! Policy/Retrieval Router, Code Generator, and Code Reviser, each backed
//! by its own experience-memory index.

pub mod error;
pub mod generator;
pub mod reviser;
pub mod router;
pub mod templates;

pub use error::{Result, RouterError};
pub use generator::CodeGenerator;
pub use reviser::{CodeReviser, FailedAttempt};
pub use router::{RouteOutcome, Router};
pub use templates::{DiagramType, RichnessBand, ALL_DIAGRAM_TYPES};
