//! gRPC registration surface.

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::info;

use crate::ledger::JobcoinClient;
use crate::Mixer;

pub mod pb {
    tonic::include_proto!("jobmix.v1");
}

pub use pb::mixer_client::MixerClient;
pub use pb::{RegisterRequest, RegisterResponse};

/// A [`Mixer`] exposed as the gRPC `Mixer` service.
pub struct MixerService<C> {
    mixer: Mixer<C>,
}

impl<C> MixerService<C> {
    pub fn new(mixer: Mixer<C>) -> Self {
        Self { mixer }
    }
}

#[tonic::async_trait]
impl<C: JobcoinClient + 'static> pb::mixer_server::Mixer for MixerService<C> {
    async fn register(
        &self,
        request: Request<pb::RegisterRequest>,
    ) -> Result<Response<pb::RegisterResponse>, Status> {
        let addresses = request.into_inner().addresses;
        let address = self
            .mixer
            .register(addresses)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        Ok(Response::new(pb::RegisterResponse { address }))
    }
}

/// Serve the registration RPC until `shutdown` is cancelled.
pub async fn serve<C: JobcoinClient + 'static>(
    mixer: Mixer<C>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), tonic::transport::Error> {
    info!(%addr, "serving registration RPC");

    Server::builder()
        .add_service(pb::mixer_server::MixerServer::new(MixerService::new(mixer)))
        .serve_with_shutdown(addr, shutdown.cancelled_owned())
        .await
}

#[cfg(test)]
mod tests {
    use super::pb::mixer_server::Mixer as _;
    use super::*;
    use crate::ledger::mock::MockLedger;

    fn service() -> MixerService<MockLedger> {
        MixerService::new(Mixer::builder(MockLedger::new()).build())
    }

    #[tokio::test]
    async fn register_returns_a_deposit_address() {
        let response = service()
            .register(Request::new(RegisterRequest {
                addresses: vec!["u1".to_string(), "u2".to_string()],
            }))
            .await
            .unwrap();

        assert!(!response.into_inner().address.is_empty());
    }

    #[tokio::test]
    async fn register_with_no_addresses_is_invalid_argument() {
        let status = service()
            .register(Request::new(RegisterRequest { addresses: vec![] }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
