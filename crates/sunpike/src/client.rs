use crate::proto::{UpdateHostStatusRequest, UpdateHostStatusResponse};

use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{IntoRequest, Response, Status};

const UPDATE_HOST_STATUS: &str = "/sunpike.conductor.v1alpha1.Conductor/UpdateHostStatus";

/// Thin unary client for the conductor service.
#[derive(Clone, Debug)]
pub struct ConductorClient {
    inner: Grpc<Channel>,
}

impl ConductorClient {
    /// Wraps an established channel.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    /// Submits the observed host and returns the conductor's view of it.
    ///
    /// # Errors
    ///
    /// Returns the status reported by the channel or the conductor.
    pub async fn update_host_status(
        &mut self,
        request: impl IntoRequest<UpdateHostStatusRequest>,
    ) -> Result<Response<UpdateHostStatusResponse>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;
        let codec = ProstCodec::default();
        let path = PathAndQuery::from_static(UPDATE_HOST_STATUS);
        self.inner.unary(request.into_request(), path, codec).await
    }
}
