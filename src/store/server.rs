use std::sync::Arc;

use hyper::body::Bytes;
use hyper::server::conn::Http;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;
use warp::Reply;

use super::Entry;
use super::KvStore;
use super::Replicator;
use crate::utils::cluster::is_majority;

/// Shared state behind the client listener.
#[derive(Debug)]
pub struct StoreContext {
    pub index: usize,
    pub name: String,
    pub cluster_token: String,
    pub cluster_size: usize,
    pub store: Arc<KvStore>,
    pub replicator: Replicator,
}

#[derive(Debug, Serialize)]
struct HealthReport<'a> {
    name: &'a str,
    index: usize,
    cluster_token: &'a str,
    keys: usize,
}

#[derive(Debug, Serialize)]
struct WriteReport {
    revision: u64,
    acks: usize,
}

/// `GET /health`, `PUT /v1/kv/{key}`, `GET /v1/kv/{key}`
pub fn client_routes(ctx: Arc<StoreContext>) -> BoxedFilter<(Response,)> {
    let with_ctx = warp::any().map(move || ctx.clone());

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_ctx.clone())
        .map(|ctx: Arc<StoreContext>| {
            warp::reply::json(&HealthReport {
                name: &ctx.name,
                index: ctx.index,
                cluster_token: &ctx.cluster_token,
                keys: ctx.store.len(),
            })
            .into_response()
        });

    let put = warp::path!("v1" / "kv" / String)
        .and(warp::put())
        .and(warp::body::bytes())
        .and(with_ctx.clone())
        .then(put_handler);

    let get = warp::path!("v1" / "kv" / String)
        .and(warp::get())
        .and(with_ctx)
        .map(|key: String, ctx: Arc<StoreContext>| match ctx.store.get(&key) {
            Some(entry) => entry.value.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        });

    health.or(put).unify().or(get).unify().boxed()
}

async fn put_handler(
    key: String,
    body: Bytes,
    ctx: Arc<StoreContext>,
) -> Response {
    let value = match String::from_utf8(body.to_vec()) {
        Ok(value) => value,
        Err(_) => {
            return warp::reply::with_status("value must be UTF-8", StatusCode::BAD_REQUEST)
                .into_response()
        }
    };

    let entry = match ctx.store.put(&key, value, ctx.index) {
        Ok(entry) => entry,
        Err(e) => {
            error!(%key, "local write failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let acks = 1 + ctx.replicator.replicate(&key, &entry).await;
    if !is_majority(acks, ctx.cluster_size) {
        warn!(%key, acks, size = ctx.cluster_size, "write not acknowledged by a majority");
        return warp::reply::with_status("no quorum", StatusCode::SERVICE_UNAVAILABLE)
            .into_response();
    }

    debug!(%key, revision = entry.version.revision, acks, "write committed");
    warp::reply::json(&WriteReport {
        revision: entry.version.revision,
        acks,
    })
    .into_response()
}

/// `PUT /peer/v1/kv/{key}`, `GET /peer/v1/snapshot`
pub fn peer_routes(store: Arc<KvStore>) -> BoxedFilter<(Response,)> {
    let with_store = warp::any().map(move || store.clone());

    let replicate = warp::path!("peer" / "v1" / "kv" / String)
        .and(warp::put())
        .and(warp::body::json())
        .and(with_store.clone())
        .map(|key: String, entry: Entry, store: Arc<KvStore>| match store.merge(&key, entry) {
            Ok(_) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => {
                error!(%key, "replicated write failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        });

    let snapshot = warp::path!("peer" / "v1" / "snapshot")
        .and(warp::get())
        .and(with_store)
        .map(|store: Arc<KvStore>| warp::reply::json(&store.snapshot()).into_response());

    replicate.or(snapshot).unify().boxed()
}

/// Accept loop of one listener, terminating TLS when an acceptor is given.
///
/// Returns once `shutdown` fires; connections still in flight are dropped
/// with the runtime.
pub async fn serve(
    name: &'static str,
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    routes: BoxedFilter<(Response,)>,
    mut shutdown: watch::Receiver<()>,
) {
    info!(listener = name, addr = ?listener.local_addr().ok(), tls = tls.is_some(), "serving");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!(listener = name, "stopped accepting connections");
                return;
            }
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(listener = name, "accept failed: {}", e);
                        continue;
                    }
                };

                let service = warp::service(routes.clone());
                let acceptor = tls.clone();
                tokio::spawn(async move {
                    let result = match acceptor {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => Http::new().serve_connection(stream, service).await,
                            Err(e) => {
                                debug!(listener = name, %remote, "TLS handshake failed: {}", e);
                                return;
                            }
                        },
                        None => Http::new().serve_connection(stream, service).await,
                    };
                    if let Err(e) = result {
                        debug!(listener = name, %remote, "connection closed with error: {}", e);
                    }
                });
            }
        }
    }
}
