//! CSI requests over a real QUIC connection to an `LvmDriver`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use libcsi::metadata::{ClusterMetadata, MetadataError, Node, PersistentVolume};
use libcsi::transport::client::CsiClient;
use libcsi::transport::server::CsiServer;
use libcsi::transport::tls;
use libcsi::{
    CreateVolumeRequest, CsiError, CsiMessage, LvmDriver, LvmDriverConfig, StatusCode,
    VolumeCapability,
};
use liblvmd::GrpcConnector;

/// A cluster without any records.
struct EmptyCluster;

#[async_trait]
impl ClusterMetadata for EmptyCluster {
    async fn get_volume(&self, volume_id: &str) -> Result<PersistentVolume, MetadataError> {
        Err(MetadataError::NotFound {
            kind: "volume",
            name: volume_id.to_owned(),
        })
    }

    async fn update_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<PersistentVolume, MetadataError> {
        Ok(volume.clone())
    }

    async fn get_node(&self, node_name: &str) -> Result<Node, MetadataError> {
        Err(MetadataError::NotFound {
            kind: "node",
            name: node_name.to_owned(),
        })
    }
}

async fn start() -> (Arc<CsiServer<LvmDriver>>, CsiClient) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
    let cert_pem = cert.cert.pem();
    let server_tls = tls::server_config_from_pem(
        cert_pem.as_bytes(),
        cert.key_pair.serialize_pem().as_bytes(),
    )
    .unwrap();
    let client_tls = tls::client_config_from_pem(cert_pem.as_bytes()).unwrap();

    let driver = LvmDriver::new(
        LvmDriverConfig::new("node-1"),
        Arc::new(EmptyCluster),
        Arc::new(GrpcConnector::default()),
    );
    let server = Arc::new(
        CsiServer::new(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            server_tls,
            Arc::new(driver),
        )
        .unwrap(),
    );
    let addr = server.endpoint().local_addr().unwrap();
    {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve().await });
    }

    let client = CsiClient::connect(addr, "localhost", client_tls)
        .await
        .unwrap();
    (server, client)
}

#[tokio::test]
async fn identity_and_create_over_quic() {
    let (server, client) = start().await;

    assert!(matches!(
        client.call(&CsiMessage::Probe).await.unwrap(),
        CsiMessage::ProbeResult(true)
    ));
    match client.call(&CsiMessage::GetPluginInfo).await.unwrap() {
        CsiMessage::PluginInfoResponse(info) => assert_eq!(info.name, "csi-lvm"),
        other => panic!("unexpected response: {other}"),
    }

    let created = client
        .call(&CsiMessage::CreateVolume(CreateVolumeRequest {
            name: "vol-1".into(),
            volume_capabilities: vec![VolumeCapability::default()],
            ..Default::default()
        }))
        .await
        .unwrap();
    match created {
        CsiMessage::VolumeCreated(v) => assert_eq!(v.volume_id.as_str(), "vol-1"),
        other => panic!("unexpected response: {other}"),
    }

    client.close();
    server.shutdown();
}

#[tokio::test]
async fn errors_cross_the_wire_with_their_class() {
    let (server, client) = start().await;

    let err = client
        .call(&CsiMessage::DeleteVolume("missing".into()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidArgument);

    let err = client
        .call(&CsiMessage::UnpublishVolume {
            volume_id: "vol-1".into(),
            target_path: String::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CsiError::InvalidArgument(_)));

    client.close();
    server.shutdown();
}
