//! The remote query service seen through one trait.
//!
//! Stores hold an `Arc<dyn QueryService>`; the live implementation is
//! [`HttpQueryService`]. Every method builds its request from the values passed
//! in (a snapshot taken when the fetch was scheduled) and returns a `'static`
//! future so it can be spawned and raced against a cancellation token.

use std::future::Future;
use std::pin::Pin;

use foundation::HierarchyView;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::protocol::{
    AttributeFilterQuery, AttributeQuery, AttributeRecord, ColumnValuesQuery,
    ConnectivityRequest, Endpoint, FeatureCollection, GeometryQuery, NameList, SearchQuery,
    decode_centroid, endpoint_url, parse_base_url,
};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type FetchResult<T> = Result<T, FetchError>;

pub trait QueryService: Send + Sync {
    /// Base geometry for a viewport.
    fn geometry(&self, query: &GeometryQuery) -> BoxFuture<'static, FetchResult<FeatureCollection>>;

    /// Distinct values of a column. Values keep their JSON type.
    fn column_values(&self, query: &ColumnValuesQuery) -> BoxFuture<'static, FetchResult<Vec<Value>>>;

    /// Columns features can be coloured by.
    fn column_names(&self) -> BoxFuture<'static, FetchResult<Vec<String>>>;

    /// Selectable level-of-detail tiers.
    fn detail_levels(&self) -> BoxFuture<'static, FetchResult<Vec<String>>>;

    fn all_with_attribute(
        &self,
        query: &AttributeFilterQuery,
    ) -> BoxFuture<'static, FetchResult<Vec<String>>>;

    /// Edge names of a shortest path or flood fill. Empty means not found.
    fn connectivity(&self, query: &ConnectivityRequest)
        -> BoxFuture<'static, FetchResult<Vec<String>>>;

    fn attributes(&self, query: &AttributeQuery) -> BoxFuture<'static, FetchResult<AttributeRecord>>;

    /// `[lng, lat]` of a named feature, `None` if the service has no location.
    fn centroid(&self, name: &str) -> BoxFuture<'static, FetchResult<Option<[f64; 2]>>>;

    fn search_complete(&self, query: &SearchQuery) -> BoxFuture<'static, FetchResult<Vec<String>>>;

    /// Children of `parent` in the location hierarchy; GXP codes for `None`.
    fn hierarchy_children(
        &self,
        parent: Option<&HierarchyView>,
    ) -> BoxFuture<'static, FetchResult<Vec<String>>>;
}

/// [`QueryService`] over HTTP GET + JSON.
#[derive(Debug, Clone)]
pub struct HttpQueryService {
    client: reqwest::Client,
    base: Url,
}

impl HttpQueryService {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            client,
            base: parse_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn get<T>(&self, endpoint: Endpoint, url: FetchResult<Url>) -> BoxFuture<'static, FetchResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.client.clone();
        Box::pin(async move { get_json(&client, endpoint, url?).await })
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    endpoint: Endpoint,
    url: Url,
) -> FetchResult<T> {
    debug!(endpoint = endpoint.path(), %url, "GET");
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            endpoint,
            status: status.as_u16(),
        });
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(format!("{}: {e}", endpoint.path())))
}

impl QueryService for HttpQueryService {
    fn geometry(&self, query: &GeometryQuery) -> BoxFuture<'static, FetchResult<FeatureCollection>> {
        self.get(Endpoint::Geometry, query.url(&self.base))
    }

    fn column_values(&self, query: &ColumnValuesQuery) -> BoxFuture<'static, FetchResult<Vec<Value>>> {
        self.get(Endpoint::ColumnValues, query.url(&self.base))
    }

    fn column_names(&self) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        let url = endpoint_url(&self.base, Endpoint::ColumnNames, &[], None);
        let fut = self.get::<NameList>(Endpoint::ColumnNames, url);
        Box::pin(async move { fut.await.map(NameList::into_vec) })
    }

    fn detail_levels(&self) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        let url = endpoint_url(&self.base, Endpoint::DetailLevels, &[], None);
        let fut = self.get::<NameList>(Endpoint::DetailLevels, url);
        Box::pin(async move { fut.await.map(NameList::into_vec) })
    }

    fn all_with_attribute(
        &self,
        query: &AttributeFilterQuery,
    ) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.get(Endpoint::AllWithAttribute, query.url(&self.base))
    }

    fn connectivity(
        &self,
        query: &ConnectivityRequest,
    ) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.get(query.endpoint(), query.url(&self.base))
    }

    fn attributes(&self, query: &AttributeQuery) -> BoxFuture<'static, FetchResult<AttributeRecord>> {
        self.get(Endpoint::Attributes, query.url(&self.base))
    }

    fn centroid(&self, name: &str) -> BoxFuture<'static, FetchResult<Option<[f64; 2]>>> {
        let url = endpoint_url(&self.base, Endpoint::Centroid, &[("name", name)], None);
        let fut = self.get::<Value>(Endpoint::Centroid, url);
        Box::pin(async move { decode_centroid(fut.await?) })
    }

    fn search_complete(&self, query: &SearchQuery) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        self.get(Endpoint::SearchComplete, query.url(&self.base))
    }

    fn hierarchy_children(
        &self,
        parent: Option<&HierarchyView>,
    ) -> BoxFuture<'static, FetchResult<Vec<String>>> {
        let url = endpoint_url(&self.base, Endpoint::Hierarchy, &[], parent);
        let fut = self.get::<NameList>(Endpoint::Hierarchy, url);
        Box::pin(async move { fut.await.map(NameList::into_vec) })
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpQueryService, QueryService};
    use crate::error::FetchError;
    use crate::protocol::{ConnectivityKind, ConnectivityRequest};

    #[test]
    fn rejects_unparseable_base() {
        assert!(matches!(
            HttpQueryService::new("::nope"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn normalises_base() {
        let svc = HttpQueryService::new("http://localhost:5000/api?x=1").expect("service");
        assert_eq!(svc.base_url().as_str(), "http://localhost:5000/api/");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // Nothing listens on the discard port.
        let svc = HttpQueryService::new("http://127.0.0.1:9/api/").expect("service");
        let err = svc
            .connectivity(&ConnectivityRequest {
                kind: ConnectivityKind::FloodFill { node: "N1".into() },
                excluded: Vec::new(),
                hierarchy: None,
            })
            .await
            .expect_err("nothing listens on port 9");
        assert!(matches!(err, FetchError::Transport(_)), "{err:?}");
    }
}
