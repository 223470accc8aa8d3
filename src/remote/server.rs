use axum::{
    extract::{DefaultBodyLimit, State},
    http::header,
    response::IntoResponse,
    routing::post,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use dxr::Fault;
use tracing::{error, info};

use super::protocol::{RemoteServer, FAULT_SERVER_ERROR};
use super::xmlrpc;

/// XML-RPC endpoint. Robot Framework posts to `/` by default; `/RPC2` is the
/// conventional XML-RPC path.
pub fn router(remote: Arc<RemoteServer>, max_request_size_bytes: usize) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/RPC2", post(handle_rpc))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_request_size_bytes)),
        )
        .with_state(remote)
}

async fn handle_rpc(State(remote): State<Arc<RemoteServer>>, body: String) -> impl IntoResponse {
    let response = remote.handle_xml(&body).await;
    let xml = xmlrpc::response_to_xml(response).unwrap_or_else(|e| {
        error!("Failed to encode response: {}", e);
        let fault = Fault::new(FAULT_SERVER_ERROR, "Failed to encode response".to_string());
        xmlrpc::response_to_xml(Err(fault)).unwrap_or_default()
    });
    ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml)
}

/// Serve until `stop_remote_server` is called or Ctrl-C is received, then
/// release the library's resources.
pub async fn serve(
    listener: TcpListener,
    remote: Arc<RemoteServer>,
    max_request_size_bytes: usize,
) -> anyhow::Result<()> {
    let stop = remote.shutdown_signal();
    let app = router(remote.clone(), max_request_size_bytes);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = stop.notified() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C");
                }
            }
        })
        .await?;

    info!("Remote server stopped");
    remote.library().shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::keywords::{MongodbLibrary, SharedLibrary};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(max_body: usize) -> Router {
        let library = SharedLibrary::new(MongodbLibrary::disconnected(AppConfig::default()));
        let remote = Arc::new(RemoteServer::new(Arc::new(library), true));
        router(remote, max_body)
    }

    async fn post_xml(app: Router, path: &str, body: String) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "text/xml")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn request(method: &str, params: Vec<dxr::Value>) -> String {
        xmlrpc::call_to_xml(&xmlrpc::call(method, params)).unwrap()
    }

    fn decode(xml: &str) -> serde_json::Value {
        let value = xmlrpc::parse_response(xml).unwrap().unwrap();
        xmlrpc::to_json(&value).unwrap()
    }

    #[tokio::test]
    async fn serves_keyword_names_on_both_paths() {
        for path in ["/", "/RPC2"] {
            let (status, xml) = post_xml(app(1024 * 1024), path, request("get_keyword_names", vec![])).await;
            assert_eq!(status, StatusCode::OK);
            let names = decode(&xml);
            assert!(names
                .as_array()
                .unwrap()
                .contains(&serde_json::json!("insert_json_document_into_collection")));
        }
    }

    #[tokio::test]
    async fn keyword_failures_come_back_as_fail_status() {
        let body = request(
            "run_keyword",
            vec![xmlrpc::string("Get Collection Names"), xmlrpc::strings(&[])],
        );
        let (status, xml) = post_xml(app(1024 * 1024), "/", body).await;
        assert_eq!(status, StatusCode::OK);
        let result = decode(&xml);
        assert_eq!(result["status"], "FAIL");
        assert_eq!(result["error"], "Not connected to a MongoDB server");
    }

    #[tokio::test]
    async fn deeply_nested_request_gets_a_fault_and_server_keeps_serving() {
        let levels = 100_000;
        let body = format!(
            "<methodCall><methodName>run_keyword</methodName><params><param>{}{}</param></params></methodCall>",
            "<value><array><data>".repeat(levels),
            "</data></array></value>".repeat(levels),
        );
        let app = app(10 * 1024 * 1024);
        let (status, xml) = post_xml(app.clone(), "/", body).await;
        assert_eq!(status, StatusCode::OK);
        let fault = xmlrpc::parse_response(&xml).unwrap().unwrap_err();
        assert_eq!(fault.code(), crate::remote::protocol::FAULT_PARSE_ERROR);

        let (status, _) = post_xml(app, "/", request("get_keyword_names", vec![])).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_requests_are_rejected() {
        let body = request("get_keyword_names", vec![xmlrpc::string(&"x".repeat(4096))]);
        let (status, _) = post_xml(app(512), "/", body).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
