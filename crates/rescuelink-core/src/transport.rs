// ── Transport seams ──
//
// The connection manager and the polling scheduler talk to the backend
// through these traits. The real implementations wrap
// `rescuelink_api::{PushClient, RestClient}`; tests substitute scripted
// fakes and drive time with `tokio::time::pause`.

use futures_util::future::BoxFuture;
use rescuelink_api::{PushClient, PushFrame, PushSession, RawRecord, RestClient};
use secrecy::SecretString;
use url::Url;

use crate::model::{Collection, Role};

type ApiResult<T> = Result<T, rescuelink_api::Error>;

/// Opens push channels.
pub trait PushConnector: Send + Sync + 'static {
    /// Perform the handshake. A 401/403 must surface as an error for
    /// which `is_auth_rejected()` is true.
    fn open(&self, url: Url) -> BoxFuture<'static, ApiResult<Box<dyn PushChannel>>>;
}

/// One open push channel.
pub trait PushChannel: Send {
    /// Next text or close frame; `None` when the stream ended.
    fn recv(&mut self) -> BoxFuture<'_, Option<ApiResult<PushFrame>>>;

    /// Close with a normal-closure frame.
    fn shutdown(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Fetches full snapshots of a collection.
pub trait SnapshotSource: Send + Sync + 'static {
    /// `role` is the session's role; sources may narrow what they ask
    /// the backend for with it.
    fn fetch(
        &self,
        collection: Collection,
        role: Role,
        token: SecretString,
    ) -> BoxFuture<'static, ApiResult<Vec<RawRecord>>>;
}

// ── Real implementations ────────────────────────────────────────────

impl PushConnector for PushClient {
    fn open(&self, url: Url) -> BoxFuture<'static, ApiResult<Box<dyn PushChannel>>> {
        let client = self.clone();
        Box::pin(async move {
            let session = client.open(&url).await?;
            Ok(Box::new(session) as Box<dyn PushChannel>)
        })
    }
}

impl PushChannel for PushSession {
    fn recv(&mut self) -> BoxFuture<'_, Option<ApiResult<PushFrame>>> {
        Box::pin(self.next_frame())
    }

    fn shutdown(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin((*self).close())
    }
}

impl SnapshotSource for RestClient {
    /// Plain users may only list their own devices.
    fn fetch(
        &self,
        collection: Collection,
        role: Role,
        token: SecretString,
    ) -> BoxFuture<'static, ApiResult<Vec<RawRecord>>> {
        let client = self.clone();
        Box::pin(async move {
            match (collection, role) {
                (Collection::Alerts, _) => client.list_alerts(&token).await,
                (Collection::Devices, Role::User) => client.list_my_devices(&token).await,
                (Collection::Devices, _) => client.list_devices(&token).await,
            }
        })
    }
}
