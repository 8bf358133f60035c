//! Axis VAPIX transport
//!
//! Digest-authenticated HTTP access to Axis network cameras: plain VAPIX
//! requests, multipart firmware/package/overlay uploads with legacy endpoint
//! fallback, SOAP web service calls and parsing of parameter and account
//! listings.

pub mod accounts;
pub mod device;
pub mod digest;
pub mod error;
pub mod param_tree;
pub mod params;
pub mod soap;
pub mod transport;
pub mod upload;

pub use accounts::{ Account, Privilege };
pub use device::{ Device, Protocol };
pub use error::{ FailureKind, Result, VapixError };
pub use param_tree::{ ParamTree, ParamTreeParser, ParamValue };
pub use transport::{
    Method,
    RequestBody,
    RequestDescriptor,
    ResponseBody,
    ResponseKind,
    Transport,
    TransportConfig,
};
pub use upload::{ UploadKind, UploadOptions, UploadOutcome };
