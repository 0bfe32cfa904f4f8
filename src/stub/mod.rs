//! Stub routing and resolution engine
//!
//! An embedded HTTP server that intercepts the tool calls an agent under
//! test issues and answers them deterministically from pre-recorded
//! fixtures. Rules come from two declaration sources (service catalogs and
//! flat per-test fixture lists), request parameters are matched fuzzily
//! (subset match with type coercion), and the whole thing serves
//! concurrently with a test run in progress.

pub mod matcher;
pub mod registry;
pub mod routes;
pub mod server;
pub mod value;

pub use registry::{FixtureRegistry, FixtureRule, Resolution, MCP_SERVICE_PREFIX};
pub use routes::CompiledRoute;
pub use server::{ServerState, StubInfo, StubServer};
pub use value::ParamValue;
