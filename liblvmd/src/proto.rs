//! Messages and client for lvmd's `proto.LVM` gRPC service.
//!
//! Messages and the client are generated from `proto/lvmd.proto`, which
//! describes only the three methods this crate calls.  Fields the daemon sends
//! beyond those are skipped on decode.

use std::fmt::Debug;

use tonic::transport::Channel;
use tonic::{Response, Status};
use tracing::{debug, trace};

#[allow(clippy::all)]
mod pb {
    tonic::include_proto!("proto");
}

pub use pb::{
    CreateLvReply, CreateLvRequest, ListLvReply, ListLvRequest, LogicalVolume, RemoveLvReply,
    RemoveLvRequest,
};

/// Generated `proto.LVM` client with every call logged.
#[derive(Debug, Clone)]
pub struct LvmClient {
    inner: pb::lvm_client::LvmClient<Channel>,
}

impl LvmClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: pb::lvm_client::LvmClient::new(channel),
        }
    }

    pub async fn list_lv(&mut self, request: ListLvRequest) -> Result<ListLvReply, Status> {
        trace!(method = "ListLV", ?request, "lvmd request");
        logged("ListLV", self.inner.list_lv(request).await)
    }

    pub async fn create_lv(&mut self, request: CreateLvRequest) -> Result<CreateLvReply, Status> {
        trace!(method = "CreateLV", ?request, "lvmd request");
        logged("CreateLV", self.inner.create_lv(request).await)
    }

    pub async fn remove_lv(&mut self, request: RemoveLvRequest) -> Result<RemoveLvReply, Status> {
        trace!(method = "RemoveLV", ?request, "lvmd request");
        logged("RemoveLV", self.inner.remove_lv(request).await)
    }
}

fn logged<T: Debug>(
    method: &'static str,
    result: Result<Response<T>, Status>,
) -> Result<T, Status> {
    match result {
        Ok(response) => {
            let response = response.into_inner();
            trace!(method, ?response, "lvmd response");
            Ok(response)
        }
        Err(status) => {
            debug!(method, error = %status, "lvmd error");
            Err(status)
        }
    }
}
