// Collaborative presence
//
// Tracks which remote collaborators are connected to a shared document and
// which field/locale each of them is editing, on top of the document
// connection's "shout" broadcast primitive.

mod channel;
mod hub;
mod live;
mod protocol;
mod table;
mod throttle;

pub use channel::ShoutChannel;
pub use hub::PresenceHub;
pub use live::{LiveValue, PresenceView};
pub use protocol::{DocEvent, FieldPath, LinkSys, ShoutMessage, UserLink};
pub use table::{PresenceEntry, PresenceTable};
pub use throttle::{FocusDecision, FocusThrottle};
