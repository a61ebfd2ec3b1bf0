//! In-process stand-in for the rendering service.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
};
use prerender::config::RendererSettings;
use tokio::{net::TcpListener, task::JoinHandle};
use url::Url;

pub struct MockRenderer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockRenderer {
    /// Serve `router` on an ephemeral loopback port, counting every request it receives.
    pub async fn spawn(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock renderer");
        let addr = listener.local_addr().expect("mock renderer address");

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = router.layer(middleware::from_fn(move |request: Request, next: Next| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                next.run(request).await
            }
        }));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, hits, handle }
    }

    pub fn endpoint(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).expect("mock renderer url")
    }

    pub fn settings(&self, timeout: Duration) -> RendererSettings {
        RendererSettings {
            endpoint: self.endpoint(),
            timeout,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockRenderer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Settings pointing at a loopback port nothing listens on.
pub async fn unreachable_settings(timeout: Duration) -> RendererSettings {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);

    RendererSettings {
        endpoint: Url::parse(&format!("http://{addr}/")).expect("probe url"),
        timeout,
    }
}
