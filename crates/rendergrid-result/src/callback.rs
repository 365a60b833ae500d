//! Outbound artifact delivery to a callback URL.
//!
//! One POST, one attempt, bounded by a timeout. The task id rides in the
//! `x-task-id` header; the body is the raw artifact. Delivery failure is
//! reported to the caller but never retried here.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use tracing::{debug, warn};

/// POST an artifact to a callback URL. Returns whether the callback
/// acknowledged with a 2xx.
pub async fn deliver_callback(
    url: &str,
    task_id: &str,
    payload: Vec<u8>,
    timeout: Duration,
) -> bool {
    let uri: http::Uri = match url.parse() {
        Ok(uri) => uri,
        Err(e) => {
            warn!(%url, error = %e, "invalid callback url");
            return false;
        }
    };
    let Some(authority) = uri.authority().map(|a| a.as_str().to_string()) else {
        warn!(%url, "callback url has no authority");
        return false;
    };
    let addr = if authority.contains(':') {
        authority.clone()
    } else {
        format!("{authority}:80")
    };

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(&addr).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %addr, "callback connection failed");
                return false;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %addr, "callback handshake failed");
                return false;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let path = uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let req = http::Request::builder()
            .method("POST")
            .uri(path)
            .header("host", &authority)
            .header("x-task-id", task_id)
            .header("content-type", "application/octet-stream")
            .header("user-agent", "rendergrid-result/0.1")
            .body(Full::new(Bytes::from(payload)))
            .unwrap();

        match sender.send_request(req).await {
            Ok(resp) => {
                if resp.status().is_success() {
                    true
                } else {
                    debug!(status = %resp.status(), %addr, "callback non-2xx");
                    false
                }
            }
            Err(e) => {
                debug!(error = %e, %addr, "callback request failed");
                false
            }
        }
    })
    .await;

    match result {
        Ok(delivered) => delivered,
        Err(_) => {
            debug!(%addr, "callback timed out");
            false
        }
    }
}
