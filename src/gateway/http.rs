use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use super::{GatewayError, NewUploadRecord, PersistenceGateway, RemoteId, RemoteRecord};

/// 基于 HTTP JSON API 的持久化网关实现
///
/// 资源布局：`POST {base}/records`、`GET/DELETE {base}/records/{id}`。
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        // Url::join 需要目录形式的基础路径
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Ok(Self {
            client: Client::new(),
            base_url: Url::parse(&normalized)?,
        })
    }

    /// Use a preconfigured client (timeouts, auth headers)
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn records_url(&self) -> Result<Url, GatewayError> {
        Ok(self.base_url.join("records")?)
    }

    fn record_url(&self, remote_id: &RemoteId) -> Result<Url, GatewayError> {
        Ok(self.base_url.join(&format!("records/{}", remote_id))?)
    }
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn create(&self, record: NewUploadRecord) -> Result<RemoteRecord, GatewayError> {
        let response = self.client
            .post(self.records_url()?)
            .json(&record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::server_error(status.as_u16(), message));
        }

        Ok(response.json().await?)
    }

    async fn delete(&self, remote_id: &RemoteId) -> Result<(), GatewayError> {
        let response = self.client
            .delete(self.record_url(remote_id)?)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(remote_id.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::server_error(status.as_u16(), message));
        }

        Ok(())
    }

    async fn get(&self, remote_id: &RemoteId) -> Result<Option<RemoteRecord>, GatewayError> {
        let response = self.client
            .get(self.record_url(remote_id)?)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::server_error(status.as_u16(), message));
        }

        Ok(Some(response.json().await?))
    }

    async fn list_all(&self) -> Result<Vec<RemoteRecord>, GatewayError> {
        let response = self.client
            .get(self.records_url()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::server_error(status.as_u16(), message));
        }

        Ok(response.json().await?)
    }
}
