//! Partial-shape matching over JSON values and the template checks built on it.

use crate::error::{IntegError, Result};
use crate::expected::{ExpectedBundle, ExpectedResource};
use crate::template::{self, Template};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Matches an asset staging directory name such as `asset.<64 chars>`.
pub const ASSET_PATH_PATTERN: &str = r"asset\.[0-9a-zA-Z]{64}";

// ---------------------------------------------------------------------------
// Expect
// ---------------------------------------------------------------------------

/// Expected shape of a JSON value.
#[derive(Debug, Clone)]
pub enum Expect {
    /// Structural equality.
    Value(Value),
    /// A string the regex finds a match in.
    Pattern(Regex),
    /// Key missing or `null`.
    Absent,
    Truthy,
    /// `false`, `0`, `""`, `null` or missing.
    Falsy,
    /// Object containing at least these keys.
    Partial(BTreeMap<String, Expect>),
    /// Object with exactly these keys; `Absent` entries may be omitted.
    Exact(BTreeMap<String, Expect>),
}

impl Expect {
    pub fn pattern(re: &str) -> Result<Self> {
        Ok(Self::Pattern(Regex::new(re)?))
    }

    pub fn value(v: impl Into<Value>) -> Self {
        Self::Value(v.into())
    }

    /// `Value` for `Some`, `Absent` for `None`.
    pub fn optional<T: Into<Value>>(v: Option<T>) -> Self {
        v.map_or(Self::Absent, |v| Self::Value(v.into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.path, self.reason)
    }
}

impl std::error::Error for Mismatch {}

/// Check `actual` against `expected`, reporting the first divergence.
pub fn contains_subset(actual: &Value, expected: &Expect) -> std::result::Result<(), Mismatch> {
    check(Some(actual), expected, "$")
}

fn mismatch(path: &str, reason: impl Into<String>) -> Mismatch {
    Mismatch {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn check(actual: Option<&Value>, expected: &Expect, path: &str) -> std::result::Result<(), Mismatch> {
    let present = actual.filter(|v| !v.is_null());
    match expected {
        Expect::Absent => match present {
            None => Ok(()),
            Some(v) => Err(mismatch(path, format!("expected absent, found {v}"))),
        },
        Expect::Truthy => match present {
            Some(v) if template::truthy(v) => Ok(()),
            other => Err(mismatch(path, format!("expected truthy, found {}", show(other)))),
        },
        Expect::Falsy => match present {
            Some(v) if template::truthy(v) => Err(mismatch(path, format!("expected falsy, found {v}"))),
            _ => Ok(()),
        },
        Expect::Value(want) => match present {
            Some(v) if v == want => Ok(()),
            other => Err(mismatch(path, format!("expected {want}, found {}", show(other)))),
        },
        Expect::Pattern(re) => match present.and_then(Value::as_str) {
            Some(s) if re.is_match(s) => Ok(()),
            _ => Err(mismatch(
                path,
                format!("expected string matching /{}/, found {}", re.as_str(), show(present)),
            )),
        },
        Expect::Partial(fields) | Expect::Exact(fields) => {
            let Some(obj) = present.and_then(Value::as_object) else {
                return Err(mismatch(path, format!("expected object, found {}", show(present))));
            };
            for (key, want) in fields {
                check(obj.get(key), want, &format!("{path}.{key}"))?;
            }
            if matches!(expected, Expect::Exact(_)) {
                if let Some((key, v)) = obj
                    .iter()
                    .find(|(k, v)| !v.is_null() && !fields.contains_key(k.as_str()))
                {
                    return Err(mismatch(path, format!("unexpected key '{key}' = {v}")));
                }
            }
            Ok(())
        }
    }
}

fn show(v: Option<&Value>) -> String {
    v.map_or_else(|| "nothing".to_string(), Value::to_string)
}

fn fields<const N: usize>(entries: [(&str, Expect); N]) -> BTreeMap<String, Expect> {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn check_resource(template: &Template, id: &str, expected: &Expect) -> Result<()> {
    let value = template.resource_value(id)?;
    contains_subset(&value, expected).map_err(|m| IntegError::Mismatch {
        context: format!("resource {id}"),
        mismatch: m,
    })
}

// ---------------------------------------------------------------------------
// Template assertions
// ---------------------------------------------------------------------------

/// Assert a resource's `Metadata` is exactly the asset metadata described by
/// `expected`, within the stack named `full_stack_name`.
pub fn assert_asset_metadata(
    template: &Template,
    full_stack_name: &str,
    expected: &ExpectedResource,
) -> Result<()> {
    let metadata = Expect::Exact(fields([
        (
            template::META_CDK_PATH,
            Expect::value(format!("{full_stack_name}/{}/Resource", expected.cdk_id)),
        ),
        (template::META_ASSET_PATH, Expect::pattern(ASSET_PATH_PATTERN)?),
        (template::META_ASSET_IS_BUNDLED, Expect::optional(expected.is_bundled)),
        (
            template::META_ASSET_DOCKERFILE_PATH,
            Expect::optional(expected.dockerfile_path.clone()),
        ),
        (template::META_ASSET_PROPERTY, Expect::value(expected.property.clone())),
    ]));
    check_resource(
        template,
        &expected.id,
        &Expect::Partial(fields([("Metadata", metadata)])),
    )
}

/// Assert the metadata of a nested-stack resource whose template is staged
/// as `<compact prefix><stack>NestedStack<8 chars>.nested.template.json`.
pub fn assert_nested_stack_metadata(
    template: &Template,
    compact_prefix: &str,
    full_stack_name: &str,
    stack: &str,
    logical_id: &str,
) -> Result<()> {
    let asset_re = format!(
        r"{}{}NestedStack[0-9A-Z]{{8}}\.nested\.template\.json",
        regex::escape(compact_prefix),
        regex::escape(stack)
    );
    let metadata = Expect::Exact(fields([
        (
            template::META_CDK_PATH,
            Expect::value(format!(
                "{full_stack_name}/NestedStack.NestedStack/NestedStack.NestedStackResource"
            )),
        ),
        (template::META_ASSET_PATH, Expect::pattern(&asset_re)?),
        (template::META_ASSET_PROPERTY, Expect::value("TemplateURL")),
    ]));
    check_resource(
        template,
        logical_id,
        &Expect::Partial(fields([("Metadata", metadata)])),
    )
}

/// Assert every file of `bundle` exists under the resource's staged asset
/// directory inside `cdk_out`.
pub fn assert_bundled_files(cdk_out: &Path, template: &Template, bundle: &ExpectedBundle) -> Result<()> {
    let resource = template.resource(&bundle.id)?;
    let asset_path = resource
        .asset_path()
        .ok_or_else(|| IntegError::MetadataMissing {
            id: bundle.id.clone(),
            key: template::META_ASSET_PATH.to_string(),
        })?;
    let asset_dir = cdk_out.join(asset_path);
    for file in &bundle.files {
        let path = asset_dir.join(file);
        tracing::trace!(id = %bundle.id, file = %file, "checking bundled file");
        if !path.exists() {
            return Err(IntegError::AssetMissing {
                id: bundle.id.clone(),
                file: file.clone(),
                path,
            });
        }
    }
    Ok(())
}

/// Bundled resources carry a truthy flag; non-bundled ones a falsy or missing one.
/// Resources with no bundling expectation are not checked.
pub fn assert_bundling_flags(template: &Template, resources: &[ExpectedResource]) -> Result<()> {
    for r in resources {
        let want = match r.is_bundled {
            Some(true) => Expect::Truthy,
            Some(false) => Expect::Falsy,
            None => continue,
        };
        let resource = template.resource(&r.id)?;
        check(
            resource.metadata_value(template::META_ASSET_IS_BUNDLED),
            &want,
            &format!("$.Metadata.{}", template::META_ASSET_IS_BUNDLED),
        )
        .map_err(|m| IntegError::Mismatch {
            context: format!("resource {}", r.id),
            mismatch: m,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const STACK: &str = "cdktest-abc123-TestStack";

    fn hash() -> String {
        "a1".repeat(32)
    }

    fn template() -> Template {
        serde_json::from_value(json!({
            "Resources": {
                "PythonFunction0BCF77FD": {
                    "Type": "AWS::Lambda::Function",
                    "Metadata": {
                        "aws:cdk:path": format!("{STACK}/PythonFunction/Resource"),
                        "aws:asset:path": format!("asset.{}", hash()),
                        "aws:asset:is-bundled": true,
                        "aws:asset:property": "Code"
                    }
                },
                "FunctionPythonRuntime28CBDA05": {
                    "Metadata": {
                        "aws:cdk:path": format!("{STACK}/FunctionPythonRuntime/Resource"),
                        "aws:asset:path": format!("asset.{}", hash()),
                        "aws:asset:is-bundled": false,
                        "aws:asset:property": "Code"
                    }
                },
                "Nested1": {
                    "Metadata": {
                        "aws:cdk:path": format!("{STACK}/NestedStack.NestedStack/NestedStack.NestedStackResource"),
                        "aws:asset:path": "cdktestabc123TestStackNestedStackAB12CD34.nested.template.json",
                        "aws:asset:property": "TemplateURL"
                    }
                }
            }
        }))
        .unwrap()
    }

    fn python_function() -> ExpectedResource {
        ExpectedResource {
            id: "PythonFunction0BCF77FD".into(),
            cdk_id: "PythonFunction".into(),
            is_bundled: Some(true),
            dockerfile_path: None,
            property: "Code".into(),
        }
    }

    #[test]
    fn partial_ignores_extra_keys_exact_does_not() {
        let actual = json!({"a": 1, "b": {"c": "x", "d": null}});
        let partial = Expect::Partial(fields([("a", Expect::value(1))]));
        assert!(contains_subset(&actual, &partial).is_ok());

        let exact = Expect::Partial(fields([(
            "b",
            Expect::Exact(fields([("c", Expect::value("x")), ("e", Expect::Absent)])),
        )]));
        assert!(contains_subset(&actual, &exact).is_ok());

        let too_strict = Expect::Exact(fields([("a", Expect::value(1))]));
        let err = contains_subset(&actual, &too_strict).unwrap_err();
        assert!(err.reason.contains("unexpected key 'b'"));
    }

    #[test]
    fn mismatch_reports_path() {
        let actual = json!({"Metadata": {"k": "v"}});
        let expect = Expect::Partial(fields([(
            "Metadata",
            Expect::Partial(fields([("k", Expect::value("w"))])),
        )]));
        let err = contains_subset(&actual, &expect).unwrap_err();
        assert_eq!(err.path, "$.Metadata.k");
    }

    #[test]
    fn asset_metadata_matches_bundled_function() {
        assert_asset_metadata(&template(), STACK, &python_function()).unwrap();
    }

    #[test]
    fn asset_metadata_rejects_wrong_flag() {
        let mut expected = python_function();
        expected.is_bundled = Some(false);
        let err = assert_asset_metadata(&template(), STACK, &expected).unwrap_err();
        assert!(err.to_string().contains("aws:asset:is-bundled"));
    }

    #[test]
    fn asset_metadata_rejects_unexpected_dockerfile_absence() {
        let mut expected = python_function();
        expected.dockerfile_path = Some("Dockerfile".into());
        assert!(assert_asset_metadata(&template(), STACK, &expected).is_err());
    }

    #[test]
    fn nested_stack_metadata() {
        assert_nested_stack_metadata(&template(), "cdktestabc123", STACK, "TestStack", "Nested1").unwrap();
        assert!(
            assert_nested_stack_metadata(&template(), "cdktestzzz", STACK, "TestStack", "Nested1").is_err()
        );
    }

    #[test]
    fn bundling_flags_truthy_and_falsy() {
        let mut plain = python_function();
        plain.id = "FunctionPythonRuntime28CBDA05".into();
        plain.is_bundled = Some(false);
        assert_bundling_flags(&template(), &[python_function(), plain.clone()]).unwrap();

        plain.is_bundled = Some(true);
        assert!(assert_bundling_flags(&template(), &[plain]).is_err());
    }

    #[test]
    fn bundled_files_must_exist() {
        let dir = TempDir::new().unwrap();
        let asset = dir.path().join(format!("asset.{}", hash()));
        std::fs::create_dir_all(asset.join("geonamescache")).unwrap();
        std::fs::write(asset.join("app.py"), "").unwrap();
        std::fs::write(asset.join("geonamescache/__init__.py"), "").unwrap();

        let mut bundle = ExpectedBundle {
            id: "PythonFunction0BCF77FD".into(),
            files: vec!["app.py".into(), "geonamescache/__init__.py".into()],
        };
        assert_bundled_files(dir.path(), &template(), &bundle).unwrap();

        bundle.files.push("geonamescache-1.3.0.dist-info".into());
        let err = assert_bundled_files(dir.path(), &template(), &bundle).unwrap_err();
        assert!(matches!(err, IntegError::AssetMissing { file, .. } if file == "geonamescache-1.3.0.dist-info"));
    }
}
