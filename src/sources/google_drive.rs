/// Google Drive data source implementation.
///
/// Uses the Google Drive API v3 for:
/// - OAuth2 authorization-code flow (offline access)
/// - Token validity probe via about.get
/// - Resource listing via files.list (paginated)
///
/// Provider responses are classified once, in `check`:
/// 401 is a dead token, 5xx or transport failure is a download error,
/// anything else non-successful is a provider error.
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use super::{DataSource, ResourceDescriptor};
use crate::config::GoogleDriveConfig;
use crate::error::{ImportError, Result};

/// Service name under which tokens are stored.
pub const SERVICE_NAME: &str = "google_drive";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Google endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: DRIVE_API_BASE.to_string(),
        }
    }
}

/// Google Drive data source.
pub struct GoogleDrive {
    client: Client,
    config: GoogleDriveConfig,
    endpoints: GoogleEndpoints,
}

impl GoogleDrive {
    pub fn new(config: GoogleDriveConfig) -> Self {
        Self::with_endpoints(config, GoogleEndpoints::default())
    }

    pub fn with_endpoints(config: GoogleDriveConfig, endpoints: GoogleEndpoints) -> Self {
        Self {
            client: Client::new(),
            config,
            endpoints,
        }
    }
}

/// files.list API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilesListResponse {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// File metadata from Google Drive API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: Option<String>,
    original_filename: Option<String>,
    size: Option<String>,
    modified_time: Option<String>,
    md5_checksum: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn transport_err(e: reqwest::Error) -> ImportError {
    ImportError::DataDownload(e.to_string())
}

/// Map a provider response onto the error taxonomy.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => ImportError::TokenExpiredOrInvalid(SERVICE_NAME.to_string()),
        s if s.is_server_error() => ImportError::DataDownload(format!("Google Drive ({status}): {body}")),
        _ => ImportError::Provider(format!("Google Drive ({status}): {body}")),
    })
}

impl From<DriveFile> for ResourceDescriptor {
    fn from(file: DriveFile) -> Self {
        let title = file.name.clone().unwrap_or_else(|| file.id.clone());
        Self {
            id: file.id,
            title,
            filename: file.original_filename.or(file.name),
            service: SERVICE_NAME.to_string(),
            checksum: file.md5_checksum,
            size: file.size.and_then(|s| s.parse().ok()),
            updated_at: file.modified_time,
        }
    }
}

#[async_trait]
impl DataSource for GoogleDrive {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn supports_oauth(&self) -> bool {
        true
    }

    async fn token_valid(&self, token: &str) -> Result<bool> {
        let resp = self
            .client
            .get(format!("{}/about", self.endpoints.api_base))
            .bearer_auth(token)
            .query(&[("fields", "user")])
            .send()
            .await
            .map_err(transport_err)?;

        check(resp).await?;
        Ok(true)
    }

    async fn list_resources(&self, token: &str) -> Result<Vec<ResourceDescriptor>> {
        let query = format!("trashed = false and mimeType != '{FOLDER_MIME_TYPE}'");
        let mut resources = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("fields", "nextPageToken,files(id,name,originalFilename,size,modifiedTime,md5Checksum)"),
                ("pageSize", "1000"),
            ];
            if let Some(cursor) = &page_token {
                params.push(("pageToken", cursor.as_str()));
            }

            let resp = self
                .client
                .get(format!("{}/files", self.endpoints.api_base))
                .bearer_auth(token)
                .query(&params)
                .send()
                .await
                .map_err(transport_err)?;

            let page: FilesListResponse = check(resp)
                .await?
                .json()
                .await
                .map_err(|e| ImportError::Serialization(format!("Failed to parse files list: {e}")))?;

            resources.extend(page.files.into_iter().map(ResourceDescriptor::from));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(resources)
    }

    fn auth_url(&self) -> Result<String> {
        let scopes = self.config.scopes.join(" ");

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            self.endpoints.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scopes),
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(transport_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // Only a client error means the code itself was rejected.
            return Err(if status.is_client_error() {
                ImportError::Auth(format!("Token exchange failed: {body}"))
            } else {
                ImportError::Provider(format!("Google Drive token endpoint ({status}): {body}"))
            });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ImportError::Auth(format!("Malformed token response: {e}")))?;

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn drive(server: &MockServer) -> GoogleDrive {
        GoogleDrive::with_endpoints(
            GoogleDriveConfig {
                client_id: "client id".into(),
                client_secret: "shh".into(),
                redirect_uri: "https://app.example/callback".into(),
                scopes: vec!["https://www.googleapis.com/auth/drive.readonly".into()],
            },
            GoogleEndpoints {
                auth_url: format!("{}/auth", server.uri()),
                token_url: format!("{}/token", server.uri()),
                api_base: server.uri(),
            },
        )
    }

    #[tokio::test]
    async fn test_token_valid_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"user": {}})))
            .mount(&server)
            .await;

        assert!(drive(&server).token_valid("tok").await.unwrap());
    }

    #[tokio::test]
    async fn test_unauthorized_is_token_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = drive(&server).token_valid("tok").await.unwrap_err();
        assert!(err.is_token_expired());
    }

    #[tokio::test]
    async fn test_server_error_is_data_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = drive(&server).token_valid("tok").await.unwrap_err();
        assert!(err.is_data_download());
    }

    #[tokio::test]
    async fn test_list_resources_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "b", "name": "b.xlsx"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "nextPageToken": "p2",
                "files": [{"id": "a", "name": "a.csv", "size": "42", "md5Checksum": "abc"}]
            })))
            .mount(&server)
            .await;

        let files = drive(&server).list_resources("tok").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, "a");
        assert_eq!(files[0].size, Some(42));
        assert_eq!(files[0].checksum.as_deref(), Some("abc"));
        assert_eq!(files[1].title, "b.xlsx");
        assert!(files.iter().all(|f| f.service == SERVICE_NAME));
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-token",
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let source = drive(&server);
        assert_eq!(source.exchange_code("good").await.unwrap(), "new-token");
        assert!(matches!(
            source.exchange_code("bad").await,
            Err(ImportError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_outage_is_not_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
            .mount(&server)
            .await;

        let err = drive(&server).exchange_code("good").await.unwrap_err();
        assert!(matches!(err, ImportError::Provider(_)));
    }

    #[test]
    fn test_auth_url_encodes_parameters() {
        let source = GoogleDrive::new(GoogleDriveConfig {
            client_id: "client id".into(),
            client_secret: "shh".into(),
            redirect_uri: "https://app.example/callback".into(),
            scopes: vec!["a".into(), "b".into()],
        });

        let url = source.auth_url().unwrap();
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example%2Fcallback"));
        assert!(url.contains("scope=a%20b"));
        assert!(!url.contains("shh"));
    }
}
