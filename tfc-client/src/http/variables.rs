//! Workspace variables.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::HttpClient;
use super::jsonapi::Resource;
use crate::api::VariableApi;
use crate::error::Result;
use crate::models::{Variable, VariableCategory, VariableOptions};
use crate::paging::{ListOptions, Page};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VariableAttributes {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    description: Option<String>,
    category: VariableCategory,
    #[serde(default)]
    hcl: bool,
    #[serde(default)]
    sensitive: bool,
}

impl Default for VariableAttributes {
    fn default() -> Self {
        Self {
            key: String::new(),
            value: None,
            description: None,
            category: VariableCategory::Terraform,
            hcl: false,
            sensitive: false,
        }
    }
}

impl From<Resource<VariableAttributes>> for Variable {
    fn from(r: Resource<VariableAttributes>) -> Self {
        let a = r.attributes;
        Variable {
            id: r.id,
            key: a.key,
            value: if a.sensitive { None } else { a.value },
            description: a.description.filter(|d| !d.is_empty()),
            category: a.category,
            hcl: a.hcl,
            sensitive: a.sensitive,
        }
    }
}

fn variable_body(opts: &VariableOptions, id: Option<&str>) -> Value {
    let mut data = json!({
        "type": "vars",
        "attributes": {
            "key": opts.key,
            "value": opts.value,
            "description": opts.description.clone().unwrap_or_default(),
            "category": opts.category.as_str(),
            "hcl": opts.hcl,
            "sensitive": opts.sensitive,
        }
    });
    if let Some(id) = id {
        data["id"] = json!(id);
    }
    json!({ "data": data })
}

#[async_trait]
impl VariableApi for HttpClient {
    async fn list_variables(
        &self,
        workspace_id: &str,
        opts: &ListOptions,
    ) -> Result<Page<Variable>> {
        let page = self
            .list::<VariableAttributes>(&format!("/workspaces/{}/vars", workspace_id), opts, "q", &[])
            .await?;
        Ok(Page {
            items: page.items.into_iter().map(Variable::from).collect(),
            next_page: page.next_page,
        })
    }

    async fn create_variable(
        &self,
        workspace_id: &str,
        opts: &VariableOptions,
    ) -> Result<Variable> {
        let r = self
            .post::<VariableAttributes>(
                &format!("/workspaces/{}/vars", workspace_id),
                &variable_body(opts, None),
            )
            .await?;
        Ok(r.into())
    }

    async fn update_variable(
        &self,
        workspace_id: &str,
        variable_id: &str,
        opts: &VariableOptions,
    ) -> Result<Variable> {
        let r = self
            .patch::<VariableAttributes>(
                &format!("/workspaces/{}/vars/{}", workspace_id, variable_id),
                &variable_body(opts, Some(variable_id)),
            )
            .await?;
        Ok(r.into())
    }

    async fn delete_variable(&self, workspace_id: &str, variable_id: &str) -> Result<()> {
        self.delete(
            &format!("/workspaces/{}/vars/{}", workspace_id, variable_id),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_value_is_dropped() {
        let raw = r#"{
            "id": "var-1",
            "type": "vars",
            "attributes": {"key": "TOKEN", "value": "", "category": "env", "sensitive": true}
        }"#;
        let r: Resource<VariableAttributes> = serde_json::from_str(raw).unwrap();
        let v = Variable::from(r);

        assert_eq!(v.category, VariableCategory::Env);
        assert!(v.sensitive);
        assert_eq!(v.value, None);
    }
}
