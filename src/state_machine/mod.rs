// Delivery state machine
//
// Pure state derivation over stored records, the per-sample lifecycle, its
// guards, and the bookkeeping writes that persist transitions.

pub mod events;
pub mod guards;
pub mod persistence;
pub mod sample_state_machine;
pub mod states;

pub use events::SampleEvent;
pub use guards::{GuardError, ProjectDeliveryDecision, StateGuard};
pub use persistence::DeliveryBookkeeping;
pub use sample_state_machine::{SampleDeliveryOutcome, SampleStateMachine};
pub use states::{DeliveryRecord, DeliveryState, DeliveryToken};
