pub use tonic::metadata;
pub use tonic::transport::Channel;
pub use tonic::{Code, IntoRequest, IntoStreamingRequest, Request, Response, Status, Streaming};
