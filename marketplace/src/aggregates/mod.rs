//! Reducers for the marketplace workflows.
//!
//! - [`booking`]: shared booking state plus creation and provider decisions
//! - [`handoff`]: receipt, return request and return confirmation
//! - [`payment_session`]: client-side payment status per booking

pub mod booking;
pub mod handoff;
pub mod payment_session;

pub use booking::{BookingAction, BookingEnvironment, BookingState, LifecycleReducer};
pub use handoff::HandoffReducer;
pub use payment_session::{
    PaymentPhase, PaymentSessionAction, PaymentSessionEnvironment, PaymentSessionReducer,
    PaymentSessionState,
};

use campus_rental_core::composition::{CombinedReducer, combine_reducers};

/// Every booking transition behind one reducer
pub type BookingReducer = CombinedReducer<BookingState, BookingAction, BookingEnvironment>;

/// Join the lifecycle and handoff reducers
#[must_use]
pub fn booking_reducer() -> BookingReducer {
    combine_reducers(vec![
        Box::new(LifecycleReducer::new()),
        Box::new(HandoffReducer::new()),
    ])
}
