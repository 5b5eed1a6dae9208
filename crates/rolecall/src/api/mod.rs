//! Provider-independent plumbing underneath [`LlmClient`](crate::client::LlmClient):
//!
//! - [`transport`]: the [`Transport`] trait and its `reqwest` implementation.
//! - [`retry`]: exponential backoff for 429/503 and dropped connections.
//!   Never retries 400/401.
//! - [`streaming`]: SSE line reassembly and the lazy [`TextStream`].
//! - [`pricing`]: per-1K-token price tables and cost math.

pub mod pricing;
pub mod retry;
pub mod streaming;
pub mod transport;

pub use pricing::{PricingInfo, pricing_for};
pub use retry::RetryPolicy;
pub use streaming::TextStream;
pub use transport::{ReqwestTransport, Transport, TransportError};
