// vcloud-api: protocol adaptation layer for the vCloud control plane
// (paginated envelopes, normalized errors, version-stamped mutations)

pub mod client;
pub mod envelope;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pagination;
pub mod response;
pub mod transport;
pub mod version;

mod xml;

pub use client::{ApiClient, ClientConfig, DEFAULT_API_VERSION, Surface};
pub use envelope::{
    ContentShape, Envelope, PageInfo, ReferenceList, decode_elements, decode_envelope,
    decode_reference_list, encode_envelope,
};
pub use error::Error;
pub use normalize::{DescribeFailure, ErrorCode, NormalizedError, ProtocolTag, normalize, normalize_response};
pub use pagination::{ElementErrorPolicy, Termination, WalkOptions, WalkOutcome, walk};
pub use response::RawResponse;
pub use transport::{TlsMode, TransportConfig};
pub use version::{Snapshot, Version, Versioned};
