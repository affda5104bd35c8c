use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use reqwest::{
    Body, Response,
    header::AUTHORIZATION,
    multipart::{Form, Part},
};
use resource_core::{
    ListQuery, LocalFile, MediaApi, ProgressFn, RemoteAsset, ResourceCenterConfig, ResourceError,
    ResourceErrorCategory, UploadOptions, message_from_error_body,
};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
const LIST_SORT: &str = "DESC_CREATED";

/// REST client for the ImageKit media library.
#[derive(Clone)]
pub struct ImageKitClient {
    http: reqwest::Client,
    list_endpoint: Url,
    upload_endpoint: Url,
    authorization: String,
}

impl std::fmt::Debug for ImageKitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageKitClient")
            .field("list_endpoint", &self.list_endpoint.as_str())
            .field("upload_endpoint", &self.upload_endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl ImageKitClient {
    pub fn new(config: &ResourceCenterConfig) -> Result<Self, ResourceError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| config_error("http_client_build_failed", err.to_string()))?;
        Self::with_http_client(http, config)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        config: &ResourceCenterConfig,
    ) -> Result<Self, ResourceError> {
        Ok(Self {
            http,
            list_endpoint: parse_endpoint("listEndpoint", &config.list_endpoint)?,
            upload_endpoint: parse_endpoint("uploadEndpoint", &config.upload_endpoint)?,
            authorization: basic_authorization(&config.private_key),
        })
    }

    fn list_url(&self, query: &ListQuery) -> Url {
        let mut url = self.list_endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("skip", &query.skip.to_string())
                .append_pair("limit", &query.limit.to_string())
                .append_pair("sort", LIST_SORT);
            if let Some(path) = query.path.as_deref() {
                pairs.append_pair("path", path);
            }
        }
        url
    }

    fn delete_url(&self, asset_id: &str) -> Result<Url, ResourceError> {
        let mut url = self.list_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| config_error("invalid_endpoint", "listEndpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(asset_id);
        Ok(url)
    }
}

impl MediaApi for ImageKitClient {
    async fn list_page(&self, query: ListQuery) -> Result<Vec<RemoteAsset>, ResourceError> {
        let url = self.list_url(&query);
        debug!(skip = query.skip, limit = query.limit, "listing media page");

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body = ensure_success(response)
            .await?
            .bytes()
            .await
            .map_err(map_reqwest_error)?;

        let page: ListResponse = serde_json::from_slice(&body).map_err(|err| {
            ResourceError::new(
                ResourceErrorCategory::Serialization,
                "invalid_list_body",
                err.to_string(),
            )
        })?;
        Ok(page.into_files())
    }

    async fn upload(
        &self,
        file: LocalFile,
        options: UploadOptions,
        progress: ProgressFn,
    ) -> Result<Option<RemoteAsset>, ResourceError> {
        let total = file.bytes.len() as u64;
        let body = progress_body(file.bytes.clone(), progress.clone());
        let mut part = Part::stream_with_length(body, total).file_name(file.name.clone());
        if !file.mime_type.is_empty() {
            part = part.mime_str(&file.mime_type).map_err(|err| {
                ResourceError::validation("unsupported_type", err.to_string())
            })?;
        }

        let mut form = Form::new()
            .part("file", part)
            .text("fileName", file.name.clone())
            .text("useUniqueFileName", "true");
        if let Some(folder) = options.folder.clone() {
            form = form.text("folder", folder);
        }
        if let Some(tags) = options.joined_tags() {
            form = form.text("tags", tags);
        }

        debug!(name = %file.name, size = total, "uploading media file");
        let response = self
            .http
            .post(self.upload_endpoint.clone())
            .header(AUTHORIZATION, &self.authorization)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body = ensure_success(response)
            .await?
            .bytes()
            .await
            .map_err(map_reqwest_error)?;
        progress(100);

        let asset = serde_json::from_slice::<RemoteAsset>(&body)
            .ok()
            .filter(|asset| !asset.id.is_empty());
        if asset.is_none() {
            debug!(name = %file.name, "upload accepted without a parseable asset body");
        }
        Ok(asset)
    }

    async fn delete(&self, asset_id: &str) -> Result<(), ResourceError> {
        let url = self.delete_url(asset_id)?;
        debug!(asset_id, "deleting media file");

        let response = self
            .http
            .delete(url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Wrapped { files: Vec<RemoteAsset> },
    Bare(Vec<RemoteAsset>),
}

impl ListResponse {
    fn into_files(self) -> Vec<RemoteAsset> {
        match self {
            Self::Wrapped { files } | Self::Bare(files) => files,
        }
    }
}

/// `Basic base64(key + ":")`.
pub fn basic_authorization(private_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{private_key}:")))
}

/// Streaming request body that reports the share of bytes handed to the transport.
fn progress_body(payload: Bytes, progress: ProgressFn) -> Body {
    let total = payload.len() as u64;
    let mut sent = 0_u64;
    let chunks: Vec<Bytes> = (0..payload.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| payload.slice(start..(start + UPLOAD_CHUNK_SIZE).min(payload.len())))
        .collect();

    let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        progress(percent_of(sent, total));
        Ok::<Bytes, std::io::Error>(chunk)
    }));
    Body::wrap_stream(stream)
}

fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

async fn ensure_success(response: Response) -> Result<Response, ResourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let status = status.as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = message_from_error_body(status, &body);
    warn!(status, %message, "media api returned an error status");
    Err(ResourceError::http_status(status, message))
}

fn map_reqwest_error(err: reqwest::Error) -> ResourceError {
    match err.status() {
        Some(status) => ResourceError::http_status(status.as_u16(), err.to_string()),
        None => ResourceError::network(err.to_string()),
    }
}

fn parse_endpoint(option: &str, value: &str) -> Result<Url, ResourceError> {
    Url::parse(value.trim())
        .map_err(|err| config_error("invalid_endpoint", format!("{option} '{value}': {err}")))
}

fn config_error(code: &str, message: impl Into<String>) -> ResourceError {
    ResourceError::new(ResourceErrorCategory::Config, code, message)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        Json, Router,
        extract::{Multipart, Path, Query},
        http::{HeaderMap, StatusCode},
        routing::{delete, get, post},
    };
    use serde_json::{Value, json};

    use super::*;

    const KEY: &str = "private_test";

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("mock server");
        });
        format!("http://{addr}")
    }

    fn client_for(base: &str) -> ImageKitClient {
        let config = ResourceCenterConfig::new(
            format!("{base}/v1/files"),
            format!("{base}/api/v1/files/upload"),
            KEY,
        );
        ImageKitClient::new(&config).expect("client should build")
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == basic_authorization(KEY))
    }

    #[test]
    fn encodes_basic_credential_with_trailing_colon() {
        assert_eq!(basic_authorization("secret"), "Basic c2VjcmV0Og==");
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let config = ResourceCenterConfig::new("not a url", "https://upload.example", "k");
        let err = ImageKitClient::new(&config).expect_err("endpoint must parse");
        assert_eq!(err.category, ResourceErrorCategory::Config);
        assert_eq!(err.code, "invalid_endpoint");
    }

    #[test]
    fn progress_reaches_full_on_empty_payload() {
        assert_eq!(percent_of(0, 0), 100);
        assert_eq!(percent_of(50, 200), 25);
        assert_eq!(percent_of(300, 200), 100);
    }

    #[tokio::test]
    async fn list_sends_paging_query_and_parses_wrapped_files() {
        async fn list(
            headers: HeaderMap,
            Query(params): Query<HashMap<String, String>>,
        ) -> (StatusCode, Json<Value>) {
            if !authorized(&headers) {
                return (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad key"})));
            }
            let echo = format!(
                "{}|{}|{}|{}",
                params.get("skip").map(String::as_str).unwrap_or_default(),
                params.get("limit").map(String::as_str).unwrap_or_default(),
                params.get("sort").map(String::as_str).unwrap_or_default(),
                params.get("path").map(String::as_str).unwrap_or("-"),
            );
            (
                StatusCode::OK,
                Json(json!({"files": [{"fileId": echo, "name": "a.png"}]})),
            )
        }

        let base = serve(Router::new().route("/v1/files", get(list))).await;
        let client = client_for(&base);

        let page = client
            .list_page(ListQuery {
                skip: 50,
                limit: 25,
                path: Some("/products".to_owned()),
            })
            .await
            .expect("list should succeed");

        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "50|25|DESC_CREATED|/products");
    }

    #[tokio::test]
    async fn list_accepts_bare_array_body() {
        async fn list() -> Json<Value> {
            Json(json!([{"fileId": "x"}, {"fileId": "y"}]))
        }

        let base = serve(Router::new().route("/v1/files", get(list))).await;
        let page = client_for(&base)
            .list_page(ListQuery {
                skip: 0,
                limit: 50,
                path: None,
            })
            .await
            .expect("bare array should parse");
        let ids: Vec<_> = page.into_iter().map(|asset| asset.id).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn error_status_uses_json_message_or_status_text() {
        async fn forbidden() -> (StatusCode, Json<Value>) {
            (
                StatusCode::FORBIDDEN,
                Json(json!({"message": "Your account cannot be authenticated."})),
            )
        }
        async fn broken() -> (StatusCode, &'static str) {
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
        }

        let base = serve(
            Router::new()
                .route("/v1/files", get(forbidden))
                .route("/v1/files/:id", delete(broken)),
        )
        .await;
        let client = client_for(&base);

        let err = client
            .list_page(ListQuery {
                skip: 0,
                limit: 10,
                path: None,
            })
            .await
            .expect_err("403 must fail");
        assert_eq!(err.category, ResourceErrorCategory::Auth);
        assert_eq!(err.status, Some(403));
        assert_eq!(err.message, "Your account cannot be authenticated.");

        let err = client.delete("abc").await.expect_err("500 must fail");
        assert_eq!(err.category, ResourceErrorCategory::Transport);
        assert_eq!(err.message, "HTTP 500");
    }

    #[tokio::test]
    async fn delete_targets_asset_path() {
        async fn remove(headers: HeaderMap, Path(id): Path<String>) -> StatusCode {
            if authorized(&headers) && id == "file 1" {
                StatusCode::NO_CONTENT
            } else {
                StatusCode::NOT_FOUND
            }
        }

        let base = serve(Router::new().route("/v1/files/:id", delete(remove))).await;
        client_for(&base)
            .delete("file 1")
            .await
            .expect("delete should succeed");
    }

    #[tokio::test]
    async fn upload_sends_form_fields_and_reports_progress() {
        async fn upload(headers: HeaderMap, mut multipart: Multipart) -> (StatusCode, Json<Value>) {
            if !authorized(&headers) {
                return (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad key"})));
            }
            let mut fields = HashMap::new();
            let mut file_len = 0;
            while let Some(field) = multipart.next_field().await.expect("next field") {
                let name = field.name().unwrap_or_default().to_owned();
                let data = field.bytes().await.expect("field bytes");
                if name == "file" {
                    file_len = data.len();
                } else {
                    fields.insert(name, String::from_utf8_lossy(&data).into_owned());
                }
            }
            (
                StatusCode::OK,
                Json(json!({
                    "fileId": "new-asset",
                    "name": fields.get("fileName"),
                    "url": format!(
                        "{}|{}|{}|{file_len}",
                        fields.get("useUniqueFileName").map(String::as_str).unwrap_or("-"),
                        fields.get("folder").map(String::as_str).unwrap_or("-"),
                        fields.get("tags").map(String::as_str).unwrap_or("-"),
                    ),
                })),
            )
        }

        let base = serve(Router::new().route("/api/v1/files/upload", post(upload))).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |percent| {
            sink.lock().expect("progress lock").push(percent);
        });

        let payload = vec![7_u8; UPLOAD_CHUNK_SIZE * 2 + 10];
        let asset = client_for(&base)
            .upload(
                LocalFile::new("cat.png", "image/png", 1, payload.clone()),
                UploadOptions {
                    folder: Some("/products".to_owned()),
                    tags: vec!["a".to_owned(), "b".to_owned()],
                },
                progress,
            )
            .await
            .expect("upload should succeed")
            .expect("server returned an asset");

        assert_eq!(asset.id, "new-asset");
        assert_eq!(asset.display_name, "cat.png");
        assert_eq!(asset.url, format!("true|/products|a,b|{}", payload.len()));

        let seen = seen.lock().expect("progress lock").clone();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn upload_without_asset_body_is_still_success() {
        async fn upload(mut multipart: Multipart) -> &'static str {
            while multipart.next_field().await.expect("next field").is_some() {}
            "ok"
        }

        let base = serve(Router::new().route("/api/v1/files/upload", post(upload))).await;
        let result = client_for(&base)
            .upload(
                LocalFile::new("a.png", "image/png", 1, vec![1, 2, 3]),
                UploadOptions::default(),
                Arc::new(|_| {}),
            )
            .await
            .expect("2xx is success");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = client_for(&format!("http://{addr}"))
            .delete("x")
            .await
            .expect_err("connection must fail");
        assert_eq!(err.code, "network_error");
        assert!(err.is_transport());
    }
}
