//! Wire and on-disk types shared by `push-sandbox-client`, `push-ledger`,
//! `push-core` and `push-cli`.

pub mod error;
pub mod event;
pub mod ledger_types;
pub mod message;
pub mod tool;

pub use error::PushErr;
pub use error::Result;
pub use event::Event;
pub use event::EventMsg;
pub use ledger_types::FileState;
pub use ledger_types::LineRange;
pub use message::Message;
pub use message::Role;
pub use tool::ToolCall;
pub use tool::ToolName;
pub use tool::ToolResult;
