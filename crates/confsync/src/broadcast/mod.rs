//! Broadcasting of committed actions and side-channel notices.

pub mod actions;
pub mod notices;

pub use actions::ActionBroadcaster;
pub use notices::{Notice, NoticeBroadcaster, NoticeKind};
