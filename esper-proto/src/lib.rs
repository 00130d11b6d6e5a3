//! ESPER device-control protocol: discovery packet codec, typed variable
//! records, and the chunked transfer state machine.
//! No I/O here; hosts provide the sockets and the HTTP transport.

pub mod discovery;
pub mod transfer;
pub mod variable;

pub use discovery::{
    decode_response, encode_request, encode_response, DecodeError, DiscoveryFilter,
    DiscoveryRequest, DiscoveryResponse, DISCOVERY_PORT,
};
pub use transfer::{
    download, upload, Direction, SessionState, TransferError, TransferSession, VariableClient,
    VariableError,
};
pub use variable::{VarType, VariableDescriptor, WriteAck};
