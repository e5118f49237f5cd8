//! Scripted [`QueryService`] for store tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use foundation::HierarchyView;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use streaming::{
    AttributeFilterQuery, AttributeQuery, AttributeRecord, BoxFuture, ColumnValuesQuery,
    ConnectivityRequest, Endpoint, FeatureCollection, FetchError, FetchResult, GeometryQuery,
    QueryService, SearchQuery, Url, decode_centroid, endpoint_url,
};
use tokio::sync::oneshot;

use crate::url_state::UrlSink;

enum Reply {
    Now(FetchResult<Value>),
    After(Duration, FetchResult<Value>),
    Held(oneshot::Receiver<FetchResult<Value>>),
}

/// The response to one held call, released by the test when it chooses.
pub(crate) struct Held(oneshot::Sender<FetchResult<Value>>);

impl Held {
    pub(crate) fn release(self, reply: FetchResult<Value>) {
        // The call may have been cancelled and dropped already.
        let _ = self.0.send(reply);
    }
}

#[derive(Default)]
struct Script {
    queued: HashMap<Endpoint, VecDeque<Reply>>,
    fallback: HashMap<Endpoint, FetchResult<Value>>,
    calls: Vec<(Endpoint, Url)>,
}

pub(crate) struct FakeService {
    base: Url,
    script: Mutex<Script>,
}

impl FakeService {
    pub(crate) fn new() -> Self {
        Self {
            base: Url::parse("http://fake/api/").expect("base url"),
            script: Mutex::new(Script::default()),
        }
    }

    /// Every call to `endpoint` answers `value` unless a queued reply exists.
    pub(crate) fn respond(&self, endpoint: Endpoint, value: Value) {
        self.script.lock().fallback.insert(endpoint, Ok(value));
    }

    pub(crate) fn fail(&self, endpoint: Endpoint, error: FetchError) {
        self.script.lock().fallback.insert(endpoint, Err(error));
    }

    /// The next call to `endpoint` answers `value` after `delay`.
    pub(crate) fn respond_after(&self, endpoint: Endpoint, delay: Duration, value: Value) {
        self.queue(endpoint, Reply::After(delay, Ok(value)));
    }

    /// The next call to `endpoint` waits until the returned handle is released.
    pub(crate) fn hold(&self, endpoint: Endpoint) -> Held {
        let (tx, rx) = oneshot::channel();
        self.queue(endpoint, Reply::Held(rx));
        Held(tx)
    }

    fn queue(&self, endpoint: Endpoint, reply: Reply) {
        self.script
            .lock()
            .queued
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    /// URLs requested from `endpoint`, oldest first.
    pub(crate) fn calls(&self, endpoint: Endpoint) -> Vec<Url> {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, u)| u.clone())
            .collect()
    }

    pub(crate) fn call_count(&self, endpoint: Endpoint) -> usize {
        self.calls(endpoint).len()
    }

    fn call<T>(&self, endpoint: Endpoint, url: FetchResult<Url>) -> BoxFuture<'static, FetchResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let reply = {
            let mut script = self.script.lock();
            if let Ok(url) = &url {
                script.calls.push((endpoint, url.clone()));
            }
            match script.queued.get_mut(&endpoint).and_then(VecDeque::pop_front) {
                Some(reply) => reply,
                None => Reply::Now(
                    script
                        .fallback
                        .get(&endpoint)
                        .cloned()
                        .unwrap_or_else(|| Ok(empty_reply(endpoint))),
                ),
            }
        };
        Box::pin(async move {
            url?;
            let value = match reply {
                Reply::Now(r) => r,
                Reply::After(delay, r) => {
                    tokio::time::sleep(delay).await;
                    r
                }
                Reply::Held(rx) => rx.await.unwrap_or(Err(FetchError::Cancelled)),
            }?;
            serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
        })
    }
}

fn empty_reply(endpoint: Endpoint) -> Value {
    match endpoint {
        Endpoint::Geometry => json!({"type": "FeatureCollection", "features": []}),
        Endpoint::Attributes => json!({}),
        _ => json!([]),
    }
}

impl QueryService for FakeService {
    fn geometry(&self, query: &GeometryQuery) -> BoxFuture<'static, FetchResult<FeatureCollection>> {
        self.call(Endpoint::Geometry, query.url(&self.base))
    }

    fn column_values(&self, query: &ColumnValuesQuery) -> BoxFuture<'static, FetchResult<Vec<Value>>> {
        self.call(Endpoint::ColumnValues, query.url(&self.base))
    }

    fn column_names(&self) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.call(
            Endpoint::ColumnNames,
            endpoint_url(&self.base, Endpoint::ColumnNames, &[], None),
        )
    }

    fn detail_levels(&self) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.call(
            Endpoint::DetailLevels,
            endpoint_url(&self.base, Endpoint::DetailLevels, &[], None),
        )
    }

    fn all_with_attribute(
        &self,
        query: &AttributeFilterQuery,
    ) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.call(Endpoint::AllWithAttribute, query.url(&self.base))
    }

    fn connectivity(
        &self,
        query: &ConnectivityRequest,
    ) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.call(query.endpoint(), query.url(&self.base))
    }

    fn attributes(&self, query: &AttributeQuery) -> BoxFuture<'static, FetchResult<AttributeRecord>> {
        self.call(Endpoint::Attributes, query.url(&self.base))
    }

    fn centroid(&self, name: &str) -> BoxFuture<'static, FetchResult<Option<[f64; 2]>>> {
        let fut = self.call::<Value>(
            Endpoint::Centroid,
            endpoint_url(&self.base, Endpoint::Centroid, &[("name", name)], None),
        );
        Box::pin(async move { decode_centroid(fut.await?) })
    }

    fn search_complete(&self, query: &SearchQuery) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.call(Endpoint::SearchComplete, query.url(&self.base))
    }

    fn hierarchy_children(
        &self,
        parent: Option<&HierarchyView>,
    ) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.call(
            Endpoint::Hierarchy,
            endpoint_url(&self.base, Endpoint::Hierarchy, &[], parent),
        )
    }
}

/// Query parameter `key` of `url`.
pub(crate) fn param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Lets spawned tasks run to completion without advancing the paused clock
/// past any pending timer.
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// In-memory page location that counts history replacements.
pub(crate) struct TestLocation(Mutex<(Url, usize)>);

impl TestLocation {
    pub(crate) fn new(url: &str) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self(Mutex::new((Url::parse(url).expect("url"), 0))))
    }

    pub(crate) fn replacements(&self) -> usize {
        self.0.lock().1
    }
}

impl UrlSink for TestLocation {
    fn current(&self) -> Url {
        self.0.lock().0.clone()
    }

    fn replace(&self, url: Url) {
        let mut location = self.0.lock();
        location.0 = url;
        location.1 += 1;
    }
}
