//! gRPC adapter exposing the limiter as an admission service.

mod key;
mod server;
mod service;

pub use key::{KeyExtractor, PeerAddrKey};
pub use server::GrpcServer;
pub use service::{AdmissionServiceImpl, RETRY_AFTER_HEADER};

// Include the generated protobuf code
pub mod proto {
    pub mod tollgate {
        pub mod admission {
            pub mod v1 {
                tonic::include_proto!("tollgate.admission.v1");
            }
        }
    }
}

// Re-export commonly used types
pub use proto::tollgate::admission::v1::{
    admission_service_client::AdmissionServiceClient,
    admission_service_server::AdmissionServiceServer, CheckRequest, CheckResponse,
};
