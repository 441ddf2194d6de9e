use async_trait::async_trait;
use listshare_shared::{CreateListArgs, ItemNameArgs, ListDto, PopularItemDto};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::error::RemoteError;
use crate::model::ShoppingList;
use crate::pipeline::RemoteOp;

/// The server-side operations the client consumes.
#[async_trait]
pub trait ListApi: Send + Sync {
    async fn create_list(&self, name: &str) -> Result<ShoppingList, RemoteError>;
    async fn fetch_list(&self, list_id: &str) -> Result<ShoppingList, RemoteError>;
    async fn add_item(&self, list_id: &str, name: &str) -> Result<(), RemoteError>;
    async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<(), RemoteError>;
    async fn rename_item(&self, list_id: &str, item_id: &str, name: &str)
    -> Result<(), RemoteError>;
    async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<(), RemoteError>;
    async fn suggestions(&self, query: &str) -> Result<Vec<String>, RemoteError>;
    async fn popular(&self, limit: usize) -> Result<Vec<String>, RemoteError>;
}

/// Runs the remote half of an optimistic mutation.
pub async fn execute(api: &dyn ListApi, op: &RemoteOp) -> Result<(), RemoteError> {
    match op {
        RemoteOp::AddItem { list_id, name } => api.add_item(list_id, name).await,
        RemoteOp::ToggleItem { list_id, item_id } => api.toggle_item(list_id, item_id).await,
        RemoteOp::RenameItem {
            list_id,
            item_id,
            name,
        } => api.rename_item(list_id, item_id, name).await,
        RemoteOp::DeleteItem { list_id, item_id } => api.delete_item(list_id, item_id).await,
    }
}

#[derive(Debug, Clone)]
pub struct HttpListApi {
    client: Client,
    base: Url,
}

impl HttpListApi {
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut path = vec!["api"];
        path.extend_from_slice(segments);
        join(&self.base, &path)
    }

    fn item_endpoint(&self, list_id: &str, item_id: &str) -> Result<Url, RemoteError> {
        self.endpoint(&["lists", list_id, "items", item_id])
    }
}

fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::NotFound(response.url().path().to_string()));
    }
    if !status.is_success() {
        return Err(RemoteError::Status(status.as_u16()));
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    check(response)?
        .json::<T>()
        .await
        .map_err(|err| RemoteError::Decode(err.to_string()))
}

#[async_trait]
impl ListApi for HttpListApi {
    #[instrument(skip(self))]
    async fn create_list(&self, name: &str) -> Result<ShoppingList, RemoteError> {
        let url = self.endpoint(&["lists"])?;
        let body = CreateListArgs {
            name: name.to_string(),
        };
        let response = self.client.post(url).json(&body).send().await?;
        let dto: ListDto = decode(response).await?;
        debug!(list_id = %dto.id, "created list");
        Ok(dto.into())
    }

    #[instrument(skip(self))]
    async fn fetch_list(&self, list_id: &str) -> Result<ShoppingList, RemoteError> {
        let url = self.endpoint(&["lists", list_id])?;
        let response = self.client.get(url).send().await?;
        let dto: ListDto = decode(response).await?;
        debug!(items = dto.items.len(), "fetched list");
        Ok(dto.into())
    }

    #[instrument(skip(self))]
    async fn add_item(&self, list_id: &str, name: &str) -> Result<(), RemoteError> {
        let url = self.endpoint(&["lists", list_id, "items"])?;
        let body = ItemNameArgs {
            name: name.to_string(),
        };
        check(self.client.post(url).json(&body).send().await?)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<(), RemoteError> {
        let url = self.item_endpoint(list_id, item_id)?;
        check(self.client.patch(url).send().await?)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename_item(
        &self,
        list_id: &str,
        item_id: &str,
        name: &str,
    ) -> Result<(), RemoteError> {
        let url = self.item_endpoint(list_id, item_id)?;
        let body = ItemNameArgs {
            name: name.to_string(),
        };
        check(self.client.put(url).json(&body).send().await?)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_item(&self, list_id: &str, item_id: &str) -> Result<(), RemoteError> {
        let url = self.item_endpoint(list_id, item_id)?;
        check(self.client.delete(url).send().await?)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn suggestions(&self, query: &str) -> Result<Vec<String>, RemoteError> {
        let mut url = self.endpoint(&["suggestions"])?;
        url.query_pairs_mut().append_pair("q", query);
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    #[instrument(skip(self))]
    async fn popular(&self, limit: usize) -> Result<Vec<String>, RemoteError> {
        let mut url = self.endpoint(&["popular"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let response = self.client.get(url).send().await?;
        let items: Vec<PopularItemDto> = decode(response).await?;
        Ok(items.into_iter().map(|item| item.name).collect())
    }
}

/// The address collaborators open to reach a list.
pub fn share_link(base: &Url, list_id: &str) -> Result<Url, RemoteError> {
    join(base, &[list_id])
}

fn join(base: &Url, segments: &[&str]) -> Result<Url, RemoteError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RemoteError::Transport(format!("unusable base url: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpListApi {
        HttpListApi::new(Url::parse(base).expect("base url"))
    }

    #[test]
    fn endpoints_follow_server_routes() {
        let api = api("http://localhost:8100");
        assert_eq!(
            api.endpoint(&["lists", "ab12cd34"]).expect("url").as_str(),
            "http://localhost:8100/api/lists/ab12cd34"
        );
        assert_eq!(
            api.item_endpoint("ab12cd34", "i1").expect("url").as_str(),
            "http://localhost:8100/api/lists/ab12cd34/items/i1"
        );
    }

    #[test]
    fn base_path_prefix_is_kept_and_segments_are_escaped() {
        let api = api("https://example.org/shopping/");
        assert_eq!(
            api.endpoint(&["lists", "a/b"]).expect("url").as_str(),
            "https://example.org/shopping/api/lists/a%2Fb"
        );
    }

    #[test]
    fn share_link_points_at_the_list_page() {
        let base = Url::parse("https://example.org/shopping/").expect("base url");
        assert_eq!(
            share_link(&base, "ab12cd34").expect("link").as_str(),
            "https://example.org/shopping/ab12cd34"
        );
        let root = Url::parse("http://localhost:8100").expect("base url");
        assert_eq!(
            share_link(&root, "ab12cd34").expect("link").as_str(),
            "http://localhost:8100/ab12cd34"
        );
    }
}
