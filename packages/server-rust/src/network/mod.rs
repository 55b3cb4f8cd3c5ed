//! Stdio MCP transport: framing, request handling, and shutdown control.

pub mod codec;
pub mod protocol;
pub mod shutdown;
pub mod stdio;

pub use codec::{Frame, FrameCodec};
pub use protocol::{McpHandler, SERVER_NAME};
pub use shutdown::*;
pub use stdio::{StdioTransport, TransportError};
