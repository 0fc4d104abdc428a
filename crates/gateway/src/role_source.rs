//! The outbound `RoleSource` transport: a manager service exposing
//! `GET /role?role=NAME` and `GET /roles?roles=N1,N2`.

use async_trait::async_trait;
use gqiam_core::Role;
use gqiam_role_cache::RoleSource;
use url::Url;

pub struct ManagerRoleSource {
    client: reqwest::Client,
    manager_url: Url,
}

impl ManagerRoleSource {
    pub fn new(client: reqwest::Client, manager_url: Url) -> Self {
        Self { client, manager_url }
    }
}

#[async_trait]
impl RoleSource for ManagerRoleSource {
    async fn get_one(&self, name: &str) -> Result<Option<Role>, anyhow::Error> {
        let mut url = self.manager_url.join("role")?;
        url.query_pairs_mut().append_pair("role", name);

        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.json::<Role>().await?))
    }

    async fn get_many(&self, names: &[String]) -> Result<Vec<Role>, anyhow::Error> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut url = self.manager_url.join("roles")?;
        url.query_pairs_mut().append_pair("roles", &names.join(","));

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json::<Vec<Role>>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_role_json(name: &str) -> String {
        format!(r#"{{"name":"{name}","policies":[]}}"#)
    }

    #[tokio::test]
    async fn get_one_returns_none_on_a_404() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/role?role=ghost").with_status(404).create_async().await;

        let source = ManagerRoleSource::new(reqwest::Client::new(), Url::parse(&server.url()).unwrap());
        assert_eq!(source.get_one("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_one_parses_the_role_body_on_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/role?role=admin")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sample_role_json("admin"))
            .create_async()
            .await;

        let source = ManagerRoleSource::new(reqwest::Client::new(), Url::parse(&server.url()).unwrap());
        let role = source.get_one("admin").await.unwrap().unwrap();
        assert_eq!(role.name, "admin");
    }

    #[tokio::test]
    async fn get_many_short_circuits_on_an_empty_name_list() {
        let server = mockito::Server::new_async().await;
        let source = ManagerRoleSource::new(reqwest::Client::new(), Url::parse(&server.url()).unwrap());
        assert_eq!(source.get_many(&[]).await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn get_many_parses_a_batch_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/roles?roles=admin%2Cauditor")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("[{},{}]", sample_role_json("admin"), sample_role_json("auditor")))
            .create_async()
            .await;

        let source = ManagerRoleSource::new(reqwest::Client::new(), Url::parse(&server.url()).unwrap());
        let roles = source.get_many(&["admin".to_string(), "auditor".to_string()]).await.unwrap();
        assert_eq!(roles.len(), 2);
    }
}
