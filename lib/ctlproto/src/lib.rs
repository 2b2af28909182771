//! The control-plane RPC protocol (§4.6): job/step query and update/signal/
//! requeue/suspend handlers, dispatched by RPC type and authorized against
//! the requesting uid, plus the caller-side retry policy and the container-
//! state and federation helpers that back specific query scenarios.

mod container_state;
mod dispatch;
mod federation;
mod flags;
mod query;
mod retry;
mod statechange;

pub use container_state::{resolve_container_state, ContainerState, JobState, StepMatch};
pub use dispatch::{DispatchTable, RpcType};
pub use federation::{select_best_cluster, ClusterCandidate};
pub use flags::QueryFlags;
pub use query::{gate, QueryHandler, QueryOutcome};
pub use retry::{is_retryable, retry_delay, retry_state_change, short_circuits, MAX_CANCEL_RETRY};
pub use statechange::{authorize, dispatch_state_change, StateChangeHandler};
