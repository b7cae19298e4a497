//! Pinecone REST client.
//!
//! Data plane (per-index host): record search with optional rerank, vector
//! upsert. Control plane (`api.pinecone.io`): describe, delete, create.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ProviderError, SearchProvider};
use crate::retrieval::{RetrievalHit, SparseVector};

const PROVIDER: &str = "Pinecone";

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2025-04";

/// Field the reranker reads from each record
const RERANK_FIELD: &str = "content";

/// Vectors per upsert request
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Poll interval while waiting for an index to become ready
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const READY_MAX_POLLS: usize = 150;

fn build_client(api_key: &str, timeout: Duration) -> anyhow::Result<Client> {
    anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");

    let mut headers = HeaderMap::new();
    headers.insert(
        "Api-Key",
        HeaderValue::from_str(api_key.trim())
            .map_err(|_| anyhow::anyhow!("invalid Pinecone API key"))?,
    );
    headers.insert("X-Pinecone-API-Version", HeaderValue::from_static(API_VERSION));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
    let resp = request.send()?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        log::warn!("pinecone error: status={status} body={body}");
        return Err(ProviderError::Status {
            provider: PROVIDER,
            status: status.as_u16(),
            body,
        });
    }

    Ok(resp)
}

fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ProviderError> {
    resp.json().map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        message: e.to_string(),
    })
}

/// Hosts from the control plane come without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Data-plane client for one index.
pub struct PineconeIndex {
    client: Client,
    host: String,
    rerank_model: Option<String>,
}

impl PineconeIndex {
    /// `rerank_model = None` disables reranking even when the pipeline passes
    /// a rerank query.
    pub fn new(
        api_key: &str,
        host: &str,
        rerank_model: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(api_key, timeout)?,
            host: normalize_host(host),
            rerank_model,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn search(
        &self,
        namespace: &str,
        vector: QueryVector<'_>,
        rerank_query: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, ProviderError> {
        let body = search_request(vector, self.rerank_model.as_deref(), rerank_query, top_k);
        let url = format!("{}/records/namespaces/{}/search", self.host, namespace);

        let resp = send(self.client.post(&url).json(&body))?;
        let parsed: SearchResponse = decode(resp)?;

        Ok(parsed.result.hits)
    }

    /// Upsert records in batches. Returns the number of vectors written.
    ///
    /// `on_batch` is called with the size of every batch once it is stored.
    pub fn upsert(
        &self,
        namespace: &str,
        records: &[UpsertRecord],
        mut on_batch: impl FnMut(usize),
    ) -> Result<usize, ProviderError> {
        let url = format!("{}/vectors/upsert", self.host);
        let mut upserted = 0;

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let body = UpsertRequest {
                vectors: batch,
                namespace,
            };

            let resp = send(self.client.post(&url).json(&body))?;
            let parsed: UpsertResponse = decode(resp)?;

            upserted += parsed.upserted_count;
            on_batch(batch.len());
        }

        Ok(upserted)
    }
}

impl SearchProvider for PineconeIndex {
    fn search_dense(
        &self,
        namespace: &str,
        vector: &[f32],
        rerank_query: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, ProviderError> {
        let vector = QueryVector {
            values: vector,
            sparse_indices: None,
            sparse_values: None,
        };
        self.search(namespace, vector, rerank_query, top_k)
    }

    fn search_sparse(
        &self,
        namespace: &str,
        vector: &[f32],
        sparse: &SparseVector,
        rerank_query: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, ProviderError> {
        // dense values are still required on a dense index
        let vector = QueryVector {
            values: vector,
            sparse_indices: Some(sparse.indices.as_slice()),
            sparse_values: Some(sparse.values.as_slice()),
        };
        self.search(namespace, vector, rerank_query, top_k)
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

fn search_request<'a>(
    vector: QueryVector<'a>,
    rerank_model: Option<&'a str>,
    rerank_query: Option<&'a str>,
    top_k: usize,
) -> SearchRequest<'a> {
    let rerank = match (rerank_model, rerank_query) {
        (Some(model), Some(query)) => Some(Rerank {
            model,
            top_n: top_k,
            rank_fields: [RERANK_FIELD],
            query,
        }),
        _ => None,
    };

    SearchRequest {
        query: SearchQuery { top_k, vector },
        rerank,
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: SearchQuery<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rerank: Option<Rerank<'a>>,
}

#[derive(Serialize)]
struct SearchQuery<'a> {
    top_k: usize,
    vector: QueryVector<'a>,
}

#[derive(Serialize)]
struct QueryVector<'a> {
    values: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    sparse_indices: Option<&'a [u32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sparse_values: Option<&'a [f32]>,
}

#[derive(Serialize)]
struct Rerank<'a> {
    model: &'a str,
    top_n: usize,
    rank_fields: [&'a str; 1],
    query: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<RetrievalHit>,
}

/// One vector as written by `upsert`.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(rename = "sparseValues", skip_serializing_if = "Option::is_none")]
    pub sparse_values: Option<SparseVector>,
    pub metadata: Map<String, Value>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [UpsertRecord],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: usize,
}

/// Index description as returned by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    #[serde(default)]
    pub dimension: Option<usize>,
    pub metric: String,
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: IndexSpec<'a>,
}

#[derive(Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

/// Control-plane client.
pub struct PineconeControl {
    client: Client,
    base_url: String,
}

impl PineconeControl {
    pub fn new(api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(api_key, timeout)?,
            base_url: CONTROL_PLANE_URL.to_string(),
        })
    }

    pub fn describe_index(&self, name: &str) -> Result<IndexDescription, ProviderError> {
        let url = format!("{}/indexes/{}", self.base_url, name);
        decode(send(self.client.get(&url))?)
    }

    pub fn delete_index(&self, name: &str) -> Result<(), ProviderError> {
        let url = format!("{}/indexes/{}", self.base_url, name);
        send(self.client.delete(&url))?;
        Ok(())
    }

    pub fn create_serverless_index(
        &self,
        name: &str,
        dimension: usize,
        metric: &str,
        cloud: &str,
        region: &str,
    ) -> Result<IndexDescription, ProviderError> {
        let url = format!("{}/indexes", self.base_url);
        let body = CreateIndexRequest {
            name,
            dimension,
            metric,
            spec: IndexSpec {
                serverless: ServerlessSpec { cloud, region },
            },
        };
        decode(send(self.client.post(&url).json(&body))?)
    }

    /// Poll until the index reports ready.
    pub fn wait_until_ready(&self, name: &str) -> Result<IndexDescription, ProviderError> {
        for _ in 0..READY_MAX_POLLS {
            let description = self.describe_index(name)?;
            if description.status.ready {
                return Ok(description);
            }
            log::debug!(
                "index {name} not ready yet (state={})",
                description.status.state.as_deref().unwrap_or("unknown")
            );
            thread::sleep(READY_POLL_INTERVAL);
        }

        Err(ProviderError::Unavailable(format!(
            "index {name} did not become ready"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("recipes-abc.svc.pinecone.io"),
            "https://recipes-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[test]
    fn test_dense_search_request_shape() {
        let values = [0.1, 0.2];
        let body = search_request(
            QueryVector {
                values: &values,
                sparse_indices: None,
                sparse_values: None,
            },
            Some("bge-reranker-v2-m3"),
            Some("seafood"),
            5,
        );

        let value = serde_json::to_value(&body).unwrap();
        let expected_values = serde_json::to_value(values).unwrap();
        assert_eq!(value["query"]["top_k"], json!(5));
        assert_eq!(value["query"]["vector"]["values"], expected_values);
        assert!(value["query"]["vector"].get("sparse_indices").is_none());
        assert_eq!(value["rerank"]["model"], json!("bge-reranker-v2-m3"));
        assert_eq!(value["rerank"]["top_n"], json!(5));
        assert_eq!(value["rerank"]["rank_fields"], json!(["content"]));
        assert_eq!(value["rerank"]["query"], json!("seafood"));
    }

    #[test]
    fn test_sparse_search_request_shape() {
        let values = [0.5];
        let sparse = SparseVector {
            indices: vec![3, 17],
            values: vec![0.6, 0.8],
        };
        let body = search_request(
            QueryVector {
                values: &values,
                sparse_indices: Some(sparse.indices.as_slice()),
                sparse_values: Some(sparse.values.as_slice()),
            },
            None,
            Some("seafood"),
            10,
        );

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["query"]["vector"]["sparse_indices"], json!([3, 17]));
        assert!(value["query"]["vector"]["sparse_values"].is_array());
        assert!(value.get("rerank").is_none());
    }

    #[test]
    fn test_search_response_parsing() {
        let response: SearchResponse = serde_json::from_value(json!({
            "result": {
                "hits": [
                    {"_id": "sheet-pan-salmon", "_score": 0.31, "fields": {"content": "Salmon"}},
                    {"_id": "seafood-pasta", "_score": 0.12, "fields": {}}
                ]
            },
            "usage": {"read_units": 6}
        }))
        .unwrap();

        assert_eq!(response.result.hits.len(), 2);
        assert_eq!(response.result.hits[0].id, "sheet-pan-salmon");
    }

    #[test]
    fn test_search_response_without_result() {
        let response: SearchResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.result.hits.is_empty());
    }

    #[test]
    fn test_upsert_record_omits_empty_sparse() {
        let record = UpsertRecord {
            id: "a".to_string(),
            values: vec![1.0],
            sparse_values: None,
            metadata: Map::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("sparseValues").is_none());

        let record = UpsertRecord {
            sparse_values: Some(SparseVector {
                indices: vec![1],
                values: vec![1.0],
            }),
            ..record
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["sparseValues"]["indices"], json!([1]));
    }

    #[test]
    fn test_index_description_parsing() {
        let description: IndexDescription = serde_json::from_value(json!({
            "name": "recipes-vector-db",
            "dimension": 1536,
            "metric": "cosine",
            "host": "recipes-vector-db-abc.svc.pinecone.io",
            "status": {"ready": true, "state": "Ready"},
            "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}}
        }))
        .unwrap();

        assert_eq!(description.metric, "cosine");
        assert_eq!(description.dimension, Some(1536));
        assert!(description.status.ready);
    }
}
