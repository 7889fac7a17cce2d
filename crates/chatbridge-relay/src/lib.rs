//! Human relay: the terminal fallback tier.
//!
//! When every automated tier has failed, a request is parked here until a
//! person supplies the answer or cancels it.

pub mod bridge;

pub use bridge::{
    HumanRelayBridge, PendingRelayRequest, RelayCallback, RelayDelivery, RelayOutcome, RelayTicket,
};
