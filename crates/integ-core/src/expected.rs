//! Expected-resource descriptors: literal test input describing what a
//! synthesized template should contain.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Asset metadata one resource is expected to carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedResource {
    /// Logical id in the template.
    pub id: String,
    /// Construct id, the second-to-last segment of `aws:cdk:path`.
    pub cdk_id: String,
    /// `None` means the template must not carry a bundling flag at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bundled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_path: Option<String>,
    pub property: String,
}

/// Files that must exist inside a resource's staged asset directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedBundle {
    pub id: String,
    pub files: Vec<String>,
}

/// A nested-stack resource whose template is staged as an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedNestedStack {
    pub id: String,
}

/// On-disk descriptor file consumed by `cli-integ validate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptors {
    /// Stack the resources live in, without the fixture prefix.
    #[serde(default = "default_stack")]
    pub stack: String,
    #[serde(default)]
    pub resources: Vec<ExpectedResource>,
    #[serde(default)]
    pub bundles: Vec<ExpectedBundle>,
    #[serde(default)]
    pub nested_stacks: Vec<ExpectedNestedStack>,
}

fn default_stack() -> String {
    "TestStack".to_string()
}

impl Descriptors {
    pub fn load(path: &Path) -> Result<Self> {
        crate::io::read_yaml(path)
    }

    /// Expectations for the SAM integration app.
    pub fn sam_app() -> Self {
        Self {
            stack: default_stack(),
            resources: sam_app_resources(),
            bundles: sam_app_bundles(),
            nested_stacks: vec![ExpectedNestedStack {
                id: SAM_APP_NESTED_STACK_ID.to_string(),
            }],
        }
    }
}

pub const SAM_APP_NESTED_STACK_ID: &str =
    "NestedStackNestedStackNestedStackNestedStackResourceB70834FD";

fn resource(
    id: &str,
    cdk_id: &str,
    is_bundled: Option<bool>,
    dockerfile_path: Option<&str>,
    property: &str,
) -> ExpectedResource {
    ExpectedResource {
        id: id.to_string(),
        cdk_id: cdk_id.to_string(),
        is_bundled,
        dockerfile_path: dockerfile_path.map(str::to_string),
        property: property.to_string(),
    }
}

fn bundle(id: &str, files: &[&str]) -> ExpectedBundle {
    ExpectedBundle {
        id: id.to_string(),
        files: files.iter().map(|f| f.to_string()).collect(),
    }
}

/// Asset metadata expected on every asset-bearing resource of the SAM app.
pub fn sam_app_resources() -> Vec<ExpectedResource> {
    vec![
        resource("PythonLayerVersion39495CEF", "PythonLayerVersion", Some(true), None, "Content"),
        resource("LayerVersion3878DA3A", "LayerVersion", Some(false), None, "Content"),
        resource(
            "BundledLayerVersionPythonRuntime6BADBD6E",
            "BundledLayerVersionPythonRuntime",
            Some(true),
            None,
            "Content",
        ),
        resource("PythonFunction0BCF77FD", "PythonFunction", Some(true), None, "Code"),
        resource(
            "LogRetentionaae0aa3c5b4d4f87b02d85b201efdd8aFD4BFC8A",
            "LogRetentionaae0aa3c5b4d4f87b02d85b201efdd8a",
            Some(false),
            None,
            "Code",
        ),
        resource("FunctionPythonRuntime28CBDA05", "FunctionPythonRuntime", Some(false), None, "Code"),
        resource(
            "BundledFunctionPythonRuntime4D9A0918",
            "BundledFunctionPythonRuntime",
            Some(true),
            None,
            "Code",
        ),
        resource("NodejsFunction09C1F20F", "NodejsFunction", Some(true), None, "Code"),
        resource("GoFunctionCA95FBAA", "GoFunction", Some(true), None, "Code"),
        resource(
            "DockerImageFunction28B773E6",
            "DockerImageFunction",
            None,
            Some("Dockerfile"),
            "Code.ImageUri",
        ),
        resource("SpecRestAPI7D4B3A34", "SpecRestAPI", None, None, "BodyS3Location"),
    ]
}

const PYTHON_DEPS: [&str; 2] = ["geonamescache/__init__.py", "geonamescache-1.3.0.dist-info"];

/// Files each bundled asset of the SAM app must stage.
pub fn sam_app_bundles() -> Vec<ExpectedBundle> {
    let layer_files = [
        "python/layer_version_dependency.py",
        "python/geonamescache/__init__.py",
        "python/geonamescache-1.3.0.dist-info",
    ];
    let bundled_fn = ["app.py", PYTHON_DEPS[0], PYTHON_DEPS[1]];
    vec![
        bundle("PythonLayerVersion39495CEF", &layer_files),
        bundle(
            "LayerVersion3878DA3A",
            &["layer_version_dependency.py", "requirements.txt"],
        ),
        bundle("BundledLayerVersionPythonRuntime6BADBD6E", &layer_files),
        bundle("PythonFunction0BCF77FD", &bundled_fn),
        bundle("FunctionPythonRuntime28CBDA05", &["app.py", "requirements.txt"]),
        bundle("BundledFunctionPythonRuntime4D9A0918", &bundled_fn),
        bundle("NodejsFunction09C1F20F", &["index.js"]),
        bundle("GoFunctionCA95FBAA", &["bootstrap"]),
        bundle(
            "DockerImageFunction28B773E6",
            &["app.js", "Dockerfile", "package.json"],
        ),
    ]
}
