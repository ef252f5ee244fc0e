//! Protocol layer of the tool host and tool caller.
//!
//! # Wire format
//!
//! Every message is one compact JSON-RPC 2.0 object on its own line. A host
//! reads requests from stdin and writes responses to stdout; logging never
//! touches stdout.
//!
//! ```text
//! caller -> {"jsonrpc":"2.0","method":"initialize","params":{...},"id":1}
//! host   <- {"jsonrpc":"2.0","result":{"protocolVersion":"2024-11-05",...},"id":1}
//! caller -> {"jsonrpc":"2.0","method":"notifications/initialized"}
//! caller -> {"jsonrpc":"2.0","method":"tools/call","params":{"name":"sum-two-numbers","arguments":{"a":15,"b":27}},"id":2}
//! host   <- {"jsonrpc":"2.0","result":{"content":[{"type":"text","text":"42"}],"structuredContent":42,"isError":false},"id":2}
//! ```
//!
//! ## Architecture
//!
//! - `types`: envelopes, request ids and error codes
//! - `protocol`: newline-delimited codec with a line length limit
//! - `jsonrpc`: method table and request dispatch
//! - `tools`: tool descriptors, registry and the `tools/*` methods
//! - `lifecycle`: handshake and host state
//! - `host`: the serving loop
//! - `caller`: the child-process client

/// Envelopes, request ids and error codes
pub mod types;

/// Newline-delimited message codec
pub mod protocol;

/// JSON-RPC method dispatch
pub mod jsonrpc;

/// Tool descriptors, registry and handlers
pub mod tools;

/// Handshake and host state
pub mod lifecycle;

/// Tool host serving loop
pub mod host;

/// Tool caller driving a host child process
pub mod caller;
