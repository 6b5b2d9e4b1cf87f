//! Local HTTP servers for exercising the clients against real sockets.

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral local port, returning its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

/// A record of what a local server was asked for.
#[derive(Clone, Debug, Default)]
pub struct Requests<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Requests<T> {
    fn push(&self, request: T) {
        self.0.lock().unwrap().push(request);
    }

    pub fn all(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }
}

/// Serves `body` with `status` for any GET request. The recorded requests
/// are the path and query of each URI.
pub async fn serve_page(
    status: StatusCode,
    body: impl Into<String>,
) -> (String, Requests<String>) {
    let requests = Requests::default();
    let body = body.into();
    let router = Router::new().fallback({
        let requests = requests.clone();
        move |uri: Uri| async move {
            requests.push(uri.to_string());
            (status, body)
        }
    });
    (serve(router).await, requests)
}

type Handler = Arc<dyn Fn(&str, &Value) -> Result<Value, Value> + Send + Sync>;

/// Serves a JSON-RPC node answering single and batched calls with `handler`,
/// which maps a method and its parameters to a result or an error object.
/// The recorded requests are the method and parameters of each call.
pub async fn serve_node(
    handler: impl Fn(&str, &Value) -> Result<Value, Value> + Send + Sync + 'static,
) -> (String, Requests<(String, Value)>) {
    let requests = Requests::default();
    let handler: Handler = Arc::new(handler);
    let router = Router::new()
        .route("/", post(answer))
        .with_state((handler, requests.clone()));
    (serve(router).await, requests)
}

async fn answer(
    State((handler, requests)): State<(Handler, Requests<(String, Value)>)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let respond = |request: &Value| {
        let method = request["method"].as_str().unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or(Value::Null);
        requests.push((method.to_owned(), params.clone()));

        let mut response = json!({ "jsonrpc": "2.0", "id": request["id"] });
        match handler(method, &params) {
            Ok(result) => response["result"] = result,
            Err(error) => response["error"] = error,
        }
        response
    };

    Json(match &body {
        Value::Array(calls) => calls.iter().map(respond).collect(),
        call => respond(call),
    })
}
