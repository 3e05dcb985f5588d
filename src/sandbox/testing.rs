//! Helpers for tests that need a local HTTP service.

use tokio::net::TcpListener;

/// Bind an ephemeral port, returning the listener and its base URL.
pub async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

pub fn spawn(listener: TcpListener, app: axum::Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: axum::Router) -> String {
    let (listener, base) = listen().await;
    spawn(listener, app);
    base
}

/// A base URL nothing is listening on.
pub async fn closed_url() -> String {
    let (listener, base) = listen().await;
    drop(listener);
    base
}
