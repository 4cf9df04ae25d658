use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use k8_rest_types::scheme;
use k8_rest_types::GroupVersionKind;
use k8_rest_types::Resource;

use crate::exec::MultiplexerConnector;
use crate::ClientError;
use crate::ClusterConfig;
use crate::K8Request;
use crate::Transport;

/// K8 cluster accessible through its REST API
pub struct K8Client {
    config: ClusterConfig,
    transport: Arc<dyn Transport>,
    mux: Option<Arc<dyn MultiplexerConnector>>,
}

pub type SharedK8Client = Arc<K8Client>;

pub fn new_shared(
    config: ClusterConfig,
    transport: impl Transport + 'static,
) -> SharedK8Client {
    Arc::new(K8Client::new(config, transport))
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionInfo {
    pub major: String,
    pub minor: String,
    pub git_version: String,
    pub git_commit: String,
    pub build_date: String,
    pub go_version: String,
    pub platform: String,
}

impl K8Client {
    pub fn new(config: ClusterConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            mux: None,
        }
    }

    /// attach the SPDY layer used by exec sessions
    pub fn with_multiplexer(mut self, connector: impl MultiplexerConnector + 'static) -> Self {
        self.mux = Some(Arc::new(connector));
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// empty request against the cluster; URL components are set by the
    /// caller (or [`Self::request`] / `set`)
    pub fn raw_request(&self) -> K8Request {
        K8Request::new(
            self.config.base().to_owned(),
            self.transport.clone(),
            self.config.credentials(),
            self.mux.clone(),
        )
    }

    /// request targeting a resource type's collection; narrow it with
    /// `namespace`/`name` and friends
    pub fn request<T: Resource>(&self) -> K8Request {
        let gvk = scheme::gvk::<T>().unwrap_or_else(|_| {
            GroupVersionKind::new(
                T::GROUP,
                T::VERSION,
                T::KIND,
                scheme::guess_path(T::KIND),
            )
        });
        self.raw_request()
            .group(gvk.group)
            .version(gvk.version)
            .resource(gvk.plural)
    }

    /// request targeting an object, optionally carrying it as the body
    pub fn request_for<T: Resource>(&self, object: &T, set_body: bool) -> K8Request {
        self.raw_request().set(object, set_body)
    }

    pub async fn server_version(&self) -> Result<VersionInfo, ClientError> {
        let info: VersionInfo = self
            .raw_request()
            .raw_uri("/version")
            .fetch_required()
            .await?;
        trace!("version info retrieved: {:#?}", info);
        Ok(info)
    }
}
