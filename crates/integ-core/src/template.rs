//! Synthesized CloudFormation template model.
//!
//! Only the parts the assertions read are typed; everything else is kept as
//! raw JSON so templates round-trip without loss.

use crate::error::{IntegError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub const META_CDK_PATH: &str = "aws:cdk:path";
pub const META_ASSET_PATH: &str = "aws:asset:path";
pub const META_ASSET_IS_BUNDLED: &str = "aws:asset:is-bundled";
pub const META_ASSET_DOCKERFILE_PATH: &str = "aws:asset:dockerfile-path";
pub const META_ASSET_PROPERTY: &str = "aws:asset:property";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "Resources", default)]
    pub resources: BTreeMap<String, Resource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(rename = "Properties", default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(rename = "Metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Template {
    /// Load a template written by `cdk synth`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IntegError::TemplateNotFound(path.to_path_buf()));
        }
        crate::io::read_json(path)
    }

    pub fn resource(&self, logical_id: &str) -> Result<&Resource> {
        self.resources
            .get(logical_id)
            .ok_or_else(|| IntegError::ResourceNotFound(logical_id.to_string()))
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.resources.contains_key(logical_id)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type.as_deref() == Some(resource_type))
    }

    /// Logical ids of every resource carrying an asset path.
    pub fn asset_resources(&self) -> impl Iterator<Item = (&String, &Resource)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.asset_path().is_some())
    }

    /// Full JSON value of one resource, for shape matching.
    pub fn resource_value(&self, logical_id: &str) -> Result<Value> {
        Ok(serde_json::to_value(self.resource(logical_id)?)?)
    }
}

impl Resource {
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata_value(key).and_then(Value::as_str)
    }

    pub fn cdk_path(&self) -> Option<&str> {
        self.metadata_str(META_CDK_PATH)
    }

    pub fn asset_path(&self) -> Option<&str> {
        self.metadata_str(META_ASSET_PATH)
    }

    pub fn asset_property(&self) -> Option<&str> {
        self.metadata_str(META_ASSET_PROPERTY)
    }

    pub fn dockerfile_path(&self) -> Option<&str> {
        self.metadata_str(META_ASSET_DOCKERFILE_PATH)
    }

    /// The bundling flag, `None` when the metadata key is absent.
    pub fn is_bundled(&self) -> Option<bool> {
        self.metadata_value(META_ASSET_IS_BUNDLED).map(truthy)
    }
}

/// JavaScript-style truthiness, matching how the CLI writes metadata flags.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Template {
        serde_json::from_value(json!({
            "Resources": {
                "PythonFunction0BCF77FD": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": {"Handler": "app.lambda_handler"},
                    "Metadata": {
                        "aws:cdk:path": "cdktest-abc-TestStack/PythonFunction/Resource",
                        "aws:asset:path": "asset.0123",
                        "aws:asset:is-bundled": true,
                        "aws:asset:property": "Code"
                    }
                },
                "Role": {"Type": "AWS::IAM::Role"}
            },
            "Parameters": {"BootstrapVersion": {"Type": "AWS::SSM::Parameter::Value<String>"}}
        }))
        .unwrap()
    }

    #[test]
    fn typed_accessors() {
        let t = sample();
        let r = t.resource("PythonFunction0BCF77FD").unwrap();
        assert_eq!(r.resource_type.as_deref(), Some("AWS::Lambda::Function"));
        assert_eq!(r.asset_path(), Some("asset.0123"));
        assert_eq!(r.is_bundled(), Some(true));
        assert_eq!(r.asset_property(), Some("Code"));
        assert_eq!(r.dockerfile_path(), None);
        assert_eq!(t.asset_resources().count(), 1);
        assert_eq!(t.resources_of_type("AWS::IAM::Role").count(), 1);
    }

    #[test]
    fn unknown_sections_are_preserved() {
        let t = sample();
        let v = serde_json::to_value(&t).unwrap();
        assert!(v["Parameters"]["BootstrapVersion"].is_object());
    }

    #[test]
    fn missing_resource_is_an_error() {
        let err = sample().resource("Nope").unwrap_err();
        assert!(matches!(err, IntegError::ResourceNotFound(id) if id == "Nope"));
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Template::load(&dir.path().join("x.template.json")).unwrap_err();
        assert!(matches!(err, IntegError::TemplateNotFound(_)));
    }

    #[test]
    fn truthiness() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!(1)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&Value::Null));
    }
}
