//! jarvis-llm — inference backend abstraction for the JARVIS bridge.
//! Implements the backend contract, the fallthrough router and the
//! guest-safe response normalizer.

pub mod audit;
pub mod backend;
pub mod codegen;
pub mod fallback;
pub mod normalize;
pub mod router;

pub use backend::{BackendClient, BackendError, BackendRequest, BackendResult, Persona};
pub use fallback::StaticResponder;
pub use normalize::{normalize, Normalizer, DEFAULT_RESPONSE_CAP};
pub use router::{build_router, BackendConfig, BackendKind, BackendRouter};
