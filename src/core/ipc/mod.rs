pub mod message;
pub mod parent;
pub mod sink;

pub use message::{Message, ParentCommand, ParentEvent};
pub use parent::{spawn_parent_reader, ParentChannel};
pub use sink::{ChannelSink, MessageSink, StdoutSink};
