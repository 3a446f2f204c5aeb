//! Domain - ドメインモデル（policy, attempt state, delivery metadata, decisions, errors）
//!
//! ここでは I/O を一切行いません。decider は純粋で、ports/app 層がその結果に従って動きます。

pub mod attempt;
pub mod decision;
pub mod delivery;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod retry;

pub use attempt::LockAttemptState;
pub use decision::{CountedRequeue, Decider, Decision, SimpleRequeue};
pub use delivery::{DeathReason, DeathRecord, Delivery, DeliveryRecord, MessageHeaders};
pub use errors::{BrokerError, ErrorKind, ExclusiveError, ExecError, LockError, RedeliveryError};
pub use ids::{DeliveryTag, ResolutionId, RunId};
pub use outcome::{Disposal, Resolution};
pub use retry::{Backoff, FixedInterval, PolicyError, RetryPolicy, RetryPolicyBuilder};
