pub mod commands;
pub mod messages;

// Re-export the message types to provide a clean public API.
pub use commands::{
    CancelOrder, CollateralInquiry, Command, ModifyOrder, SubmitAtomicOrder, SubmitOrder,
};
pub use messages::{
    AccountEvent, Event, OrderCancelReject, OrderCancelled, OrderExpired, OrderFilled,
    OrderModified, OrderPartiallyFilled, OrderRejected, PositionEvent, PositionEventKind,
    TimeEvent,
};
