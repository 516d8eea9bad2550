//! Review gate and approval notifier.

mod gate;
mod notifier;

pub use gate::ReviewGate;
pub use notifier::{ApprovalNotifier, StatusSink};
