//! In-process fake of an etcd v2 member for integration tests
//!
//! Keeps a flat map of nodes and an event history so waits with `waitIndex`
//! can be answered from the past, and long polls block until a matching
//! change arrives. Every request is recorded for assertions.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use url::form_urlencoded;

/// A request as received by a fake server
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path_and_query: String,
    pub body: String,
}

impl Recorded {
    pub fn is_wait(&self) -> bool {
        self.method == Method::GET && self.path_and_query.contains("wait=true")
    }
}

#[derive(Debug, Clone)]
struct StoredNode {
    value: Option<String>,
    dir: bool,
    created: u64,
    modified: u64,
    ttl: Option<i64>,
}

struct Event {
    key: String,
    index: u64,
    body: Value,
}

#[derive(Default)]
struct State {
    index: u64,
    nodes: BTreeMap<String, StoredNode>,
    events: Vec<Event>,
    compacted_through: u64,
    requests: Vec<Recorded>,
}

/// Accept loop serving `handler` over HTTP/1.1 on an ephemeral local port
pub async fn serve<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler(req).await) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// Server answering every request with `status` and a fixed body
pub async fn start_fixed(status: u16, body: &'static str) -> String {
    let addr = serve(move |_req| async move {
        Response::builder()
            .status(status)
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    })
    .await;
    format!("http://{}", addr)
}

/// Server redirecting every request to the same path on `target`
pub async fn start_redirector(target: String) -> String {
    start_redirector_with(StatusCode::TEMPORARY_REDIRECT, target).await
}

/// Server answering every request with `status` pointing at `target`
pub async fn start_redirector_with(status: StatusCode, target: String) -> String {
    let addr = serve(move |req: Request<Incoming>| {
        let location = format!(
            "{}{}",
            target,
            req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
        );
        async move {
            Response::builder()
                .status(status)
                .header("Location", location)
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
    })
    .await;
    format!("http://{}", addr)
}

/// Server redirecting every request to itself with a relative location
pub async fn start_redirect_loop() -> String {
    let addr = serve(|req: Request<Incoming>| {
        let location = req.uri().path().to_string();
        async move {
            Response::builder()
                .status(StatusCode::TEMPORARY_REDIRECT)
                .header("Location", location)
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
    })
    .await;
    format!("http://{}", addr)
}

/// Server that accepts requests and never answers within a test's lifetime
pub async fn start_stalled() -> String {
    let addr = serve(|_req| async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Response::new(Full::new(Bytes::new()))
    })
    .await;
    format!("http://{}", addr)
}

/// An address nothing listens on
pub async fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Fake etcd v2 member
#[derive(Clone)]
pub struct FakeEtcd {
    state: Arc<Mutex<State>>,
    index_tx: Arc<watch::Sender<u64>>,
}

impl FakeEtcd {
    /// Start a member and return it with its endpoint
    pub async fn start() -> (FakeEtcd, String) {
        let (index_tx, _) = watch::channel(0);
        let fake = FakeEtcd {
            state: Arc::new(Mutex::new(State::default())),
            index_tx: Arc::new(index_tx),
        };

        let handler = fake.clone();
        let addr = serve(move |req| {
            let handler = handler.clone();
            async move { handler.handle(req).await }
        })
        .await;

        (fake, format!("http://{}", addr))
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Wait requests received so far
    pub fn wait_requests(&self) -> Vec<Recorded> {
        self.requests().into_iter().filter(Recorded::is_wait).collect()
    }

    /// Poll until at least `count` wait requests have arrived
    pub async fn until_wait_requests(&self, count: usize) {
        while self.wait_requests().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Current cluster index
    pub fn index(&self) -> u64 {
        self.state.lock().unwrap().index
    }

    /// Drop event history up to and including `index`
    pub fn compact_through(&self, index: u64) {
        self.state.lock().unwrap().compacted_through = index;
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default();
        let query = req.uri().query().unwrap_or("").to_string();
        let body = match req.into_body().collect().await {
            Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            Err(_) => String::new(),
        };

        // index observed before the request becomes visible to tests
        let arrival_index = self.index();
        self.state.lock().unwrap().requests.push(Recorded {
            method: method.clone(),
            path_and_query,
            body: body.clone(),
        });

        if method == Method::GET && path == "/version" {
            return self.json(StatusCode::OK, json!({"etcdserver": "2.3.8", "etcdcluster": "2.3.0"}));
        }

        let Some(raw_key) = path.strip_prefix("/v2/keys") else {
            return Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("404 page not found\n")))
                .unwrap();
        };
        let key = normalize_key(&percent_decode_str(raw_key).decode_utf8_lossy());

        let form = if method == Method::PUT || method == Method::POST {
            body
        } else {
            query
        };
        let params: HashMap<String, String> =
            form_urlencoded::parse(form.as_bytes()).into_owned().collect();

        match method {
            Method::GET if flag(&params, "wait") => self.wait(&key, &params, arrival_index).await,
            Method::GET => self.get(&key, &params),
            Method::PUT => self.put(&key, &params),
            Method::POST => self.post(&key, &params),
            Method::DELETE => self.delete(&key, &params),
            _ => Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .body(Full::new(Bytes::new()))
                .unwrap(),
        }
    }

    fn json(&self, status: StatusCode, body: Value) -> Response<Full<Bytes>> {
        let index = self.index();
        json_response(status, body, index)
    }

    fn get(&self, key: &str, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
        let st = self.state.lock().unwrap();
        let recursive = flag(params, "recursive");

        let node = if key == "/" {
            json!({"key": "/", "dir": true, "nodes": children_json(&st, key, recursive)})
        } else {
            let Some(stored) = st.nodes.get(key) else {
                return etcd_error(100, "Key not found", key, st.index);
            };
            let mut node = node_json(key, stored);
            if stored.dir {
                let children = children_json(&st, key, recursive);
                if !children.is_empty() {
                    node["nodes"] = json!(children);
                }
            }
            node
        };

        json_response(StatusCode::OK, json!({"action": "get", "node": node}), st.index)
    }

    async fn wait(
        &self,
        key: &str,
        params: &HashMap<String, String>,
        arrival_index: u64,
    ) -> Response<Full<Bytes>> {
        let recursive = flag(params, "recursive");
        let wait_index: Option<u64> = params.get("waitIndex").and_then(|v| v.parse().ok());

        let mut rx = self.index_tx.subscribe();
        let from = wait_index.unwrap_or(arrival_index + 1);

        loop {
            {
                let st = self.state.lock().unwrap();
                if from <= st.compacted_through {
                    let cause = format!(
                        "the requested history has been cleared [{}/{}]",
                        st.compacted_through + 1,
                        from
                    );
                    return etcd_error(401, "The event in requested index is outdated and cleared", &cause, st.index);
                }
                let hit = st
                    .events
                    .iter()
                    .find(|e| e.index >= from && watches(key, &e.key, recursive));
                if let Some(event) = hit {
                    return json_response(StatusCode::OK, event.body.clone(), st.index);
                }
            }
            if rx.changed().await.is_err() {
                return Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::new()))
                    .unwrap();
            }
        }
    }

    fn put(&self, key: &str, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
        let mut st = self.state.lock().unwrap();
        let existing = st.nodes.get(key).cloned();

        let prev_exist = params.get("prevExist").map(|v| v == "true");
        match (prev_exist, &existing) {
            (Some(false), Some(_)) => return etcd_error(105, "Key already exists", key, st.index),
            (Some(true), None) => return etcd_error(100, "Key not found", key, st.index),
            _ => {}
        }

        let compare = match check_conditions(&st, key, params, existing.as_ref()) {
            Ok(compare) => compare,
            Err(resp) => return resp,
        };

        let is_dir = flag(params, "dir");
        let ttl = match params.get("ttl").map(String::as_str) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(ttl) => Some(ttl),
                Err(_) => return etcd_error(202, "The given TTL in POST form is not a number", "Update", st.index),
            },
        };
        let value = if is_dir {
            None
        } else {
            params
                .get("value")
                .cloned()
                .or_else(|| existing.as_ref().and_then(|n| n.value.clone()))
                .or_else(|| Some(String::new()))
        };

        st.index += 1;
        let index = st.index;
        ensure_parents(&mut st, key, index);
        let stored = StoredNode {
            value,
            dir: is_dir,
            created: existing.as_ref().map(|n| n.created).unwrap_or(index),
            modified: index,
            ttl,
        };
        st.nodes.insert(key.to_string(), stored.clone());

        let action = if compare {
            "compareAndSwap"
        } else {
            match prev_exist {
                Some(true) => "update",
                Some(false) => "create",
                None => "set",
            }
        };
        let mut body = json!({"action": action, "node": node_json(key, &stored)});
        if let Some(prev) = &existing {
            body["prevNode"] = node_json(key, prev);
        }

        let status = if existing.is_some() {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        };
        self.commit(st, key, body, status)
    }

    fn post(&self, key: &str, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
        let mut st = self.state.lock().unwrap();
        if st.nodes.get(key).is_some_and(|n| !n.dir) {
            return etcd_error(104, "Not a directory", key, st.index);
        }

        st.index += 1;
        let index = st.index;
        let child = format!("{}/{:020}", key.trim_end_matches('/'), index);
        ensure_parents(&mut st, &child, index);
        let stored = StoredNode {
            value: Some(params.get("value").cloned().unwrap_or_default()),
            dir: false,
            created: index,
            modified: index,
            ttl: None,
        };
        st.nodes.insert(child.clone(), stored.clone());

        let body = json!({"action": "create", "node": node_json(&child, &stored)});
        self.commit(st, &child, body, StatusCode::CREATED)
    }

    fn delete(&self, key: &str, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
        let mut st = self.state.lock().unwrap();
        let Some(existing) = st.nodes.get(key).cloned() else {
            return etcd_error(100, "Key not found", key, st.index);
        };

        let compare = match check_conditions(&st, key, params, Some(&existing)) {
            Ok(compare) => compare,
            Err(resp) => return resp,
        };

        let recursive = flag(params, "recursive");
        let prefix = format!("{}/", key);
        if existing.dir {
            if !recursive && !flag(params, "dir") {
                return etcd_error(102, "Not a file", key, st.index);
            }
            let has_children = st.nodes.keys().any(|k| k.starts_with(&prefix));
            if has_children && !recursive {
                return etcd_error(108, "Directory not empty", key, st.index);
            }
        }

        st.nodes.retain(|k, _| k != key && !k.starts_with(&prefix));
        st.index += 1;
        let index = st.index;

        let mut node = json!({"key": key, "createdIndex": existing.created, "modifiedIndex": index});
        if existing.dir {
            node["dir"] = json!(true);
        }
        let action = if compare { "compareAndDelete" } else { "delete" };
        let body = json!({"action": action, "node": node, "prevNode": node_json(key, &existing)});
        self.commit(st, key, body, StatusCode::OK)
    }

    fn commit(
        &self,
        mut st: std::sync::MutexGuard<'_, State>,
        key: &str,
        body: Value,
        status: StatusCode,
    ) -> Response<Full<Bytes>> {
        let index = st.index;
        st.events.push(Event {
            key: key.to_string(),
            index,
            body: body.clone(),
        });
        drop(st);
        self.index_tx.send_replace(index);
        json_response(status, body, index)
    }
}

/// Apply prevValue / prevIndex guards. Returns whether a comparison was requested.
fn check_conditions(
    st: &State,
    key: &str,
    params: &HashMap<String, String>,
    existing: Option<&StoredNode>,
) -> Result<bool, Response<Full<Bytes>>> {
    let prev_value = params.get("prevValue");
    let prev_index: Option<u64> = params.get("prevIndex").and_then(|v| v.parse().ok());
    if prev_value.is_none() && prev_index.is_none() {
        return Ok(false);
    }

    let Some(node) = existing else {
        return Err(etcd_error(100, "Key not found", key, st.index));
    };
    let current = node.value.clone().unwrap_or_default();
    if let Some(expected) = prev_value {
        if *expected != current {
            let cause = format!("[{} != {}]", expected, current);
            return Err(etcd_error(101, "Compare failed", &cause, st.index));
        }
    }
    if let Some(expected) = prev_index {
        if expected != node.modified {
            let cause = format!("[{} != {}]", expected, node.modified);
            return Err(etcd_error(101, "Compare failed", &cause, st.index));
        }
    }
    Ok(true)
}

fn ensure_parents(st: &mut State, key: &str, index: u64) {
    let mut parent = String::new();
    let segments: Vec<&str> = key.trim_start_matches('/').split('/').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        parent.push('/');
        parent.push_str(segment);
        st.nodes.entry(parent.clone()).or_insert(StoredNode {
            value: None,
            dir: true,
            created: index,
            modified: index,
            ttl: None,
        });
    }
}

fn flag(params: &HashMap<String, String>, name: &str) -> bool {
    params.get(name).is_some_and(|v| v == "true")
}

fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    format!("/{}", trimmed)
}

fn watches(watched: &str, changed: &str, recursive: bool) -> bool {
    if watched == changed {
        return true;
    }
    recursive && (watched == "/" || changed.starts_with(&format!("{}/", watched)))
}

fn node_json(key: &str, node: &StoredNode) -> Value {
    let mut value = json!({
        "key": key,
        "createdIndex": node.created,
        "modifiedIndex": node.modified,
    });
    if node.dir {
        value["dir"] = json!(true);
    } else {
        value["value"] = json!(node.value);
    }
    if let Some(ttl) = node.ttl {
        value["ttl"] = json!(ttl);
    }
    value
}

fn children_json(st: &State, key: &str, recursive: bool) -> Vec<Value> {
    let prefix = if key == "/" {
        "/".to_string()
    } else {
        format!("{}/", key)
    };
    st.nodes
        .iter()
        .filter(|(k, _)| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
        .map(|(k, node)| {
            let mut value = node_json(k, node);
            if node.dir && recursive {
                let children = children_json(st, k, true);
                if !children.is_empty() {
                    value["nodes"] = json!(children);
                }
            }
            value
        })
        .collect()
}

fn json_response(status: StatusCode, body: Value, index: u64) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("X-Etcd-Index", index.to_string())
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn etcd_error(code: u64, message: &str, cause: &str, index: u64) -> Response<Full<Bytes>> {
    let status = match code {
        100 => StatusCode::NOT_FOUND,
        101 | 105 => StatusCode::PRECONDITION_FAILED,
        102 | 104 | 108 => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_REQUEST,
    };
    json_response(
        status,
        json!({"errorCode": code, "message": message, "cause": cause, "index": index}),
        index,
    )
}
