//! The `sam` command surface and local API emulation.
//!
//! `sam local start-api` serves the functions of a template over HTTP. The
//! emulator is started as a background process, awaited until it prints its
//! readiness line, invoked once over HTTP, then always killed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::process::{Shell, ShellOptions, ShellOutput};
use crate::{DriverError, Result};

pub const LOCAL_HOST: &str = "127.0.0.1";

/// Outcome of driving a local emulation action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionOutput {
    pub action_succeeded: bool,
    /// Parsed JSON body; a non-JSON body is kept as a string value.
    pub action_output: Option<Value>,
    /// Emulator transcript up to the point the action completed.
    pub shell_output: String,
}

/// A located `sam` binary bound to a [`Shell`].
#[derive(Clone)]
pub struct SamCli {
    bin: PathBuf,
    shell: Shell,
}

impl SamCli {
    pub fn new(bin: impl Into<PathBuf>, shell: Shell) -> Self {
        Self {
            bin: bin.into(),
            shell,
        }
    }

    pub async fn run(&self, args: &[String], opts: &ShellOptions) -> Result<ShellOutput> {
        self.shell.run(&self.bin, args, opts).await
    }

    /// `sam build --template <template>`
    pub async fn build(&self, template: &Path, opts: &ShellOptions) -> Result<ShellOutput> {
        self.run(&build_args(template), opts).await
    }

    /// Start the emulator, wait for readiness, GET `api_path`, stop the emulator.
    ///
    /// `template` is `None` after `sam build`, in which case sam picks up the
    /// built template on its own.
    pub async fn local_start_api(
        &self,
        template: Option<&Path>,
        port: u16,
        api_path: &str,
        ready_timeout: Duration,
        opts: &ShellOptions,
    ) -> Result<ActionOutput> {
        let args = start_api_args(template, port);
        let mut process = self.shell.spawn(&self.bin, &args, opts)?;
        let ready = readiness_line(port);

        let result = async {
            process
                .wait_for_line(|line| line.contains(&ready), ready_timeout)
                .await?;
            tracing::info!(port, api_path, "local api ready");
            invoke_api(LOCAL_HOST, port, api_path).await
        }
        .await;

        let transcript = process.transcript();
        process.stop().await;

        let mut output = result?;
        output.shell_output = transcript;
        Ok(output)
    }
}

pub fn build_args(template: &Path) -> Vec<String> {
    vec![
        "build".to_string(),
        "--template".to_string(),
        template.display().to_string(),
    ]
}

pub fn start_api_args(template: Option<&Path>, port: u16) -> Vec<String> {
    let mut args = vec!["local".to_string(), "start-api".to_string()];
    if let Some(t) = template {
        args.push("--template".into());
        args.push(t.display().to_string());
    }
    args.push("--port".into());
    args.push(port.to_string());
    args
}

/// The line `sam local start-api` prints once it accepts requests.
pub fn readiness_line(port: u16) -> String {
    format!("Running on http://{LOCAL_HOST}:{port}/")
}

/// GET `http://<host>:<port><api_path>` and report the response.
///
/// Transport failures are errors; an HTTP error status is reported as an
/// unsuccessful action carrying the response body.
pub async fn invoke_api(host: &str, port: u16, api_path: &str) -> Result<ActionOutput> {
    let url = format!("http://{host}:{port}{api_path}");
    let response = reqwest::get(&url).await.map_err(|source| DriverError::Http {
        url: url.clone(),
        source,
    })?;
    let status = response.status();
    let body = response.text().await.map_err(|source| DriverError::Http {
        url: url.clone(),
        source,
    })?;
    tracing::debug!(%url, status = status.as_u16(), "local api responded");

    let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
    Ok(ActionOutput {
        action_succeeded: status.is_success(),
        action_output: Some(parsed),
        shell_output: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_api_args_with_and_without_template() {
        assert_eq!(
            start_api_args(Some(Path::new("cdk.out/S.template.json")), 3000),
            ["local", "start-api", "--template", "cdk.out/S.template.json", "--port", "3000"]
        );
        assert_eq!(
            start_api_args(None, 3001),
            ["local", "start-api", "--port", "3001"]
        );
    }

    #[test]
    fn readiness_line_format() {
        assert_eq!(readiness_line(31234), "Running on http://127.0.0.1:31234/");
    }

    #[tokio::test]
    async fn invoke_api_parses_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/restapis/spec/pythonFunction")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "Hello World"}"#)
            .create_async()
            .await;

        let port = server.socket_address().port();
        let out = invoke_api(LOCAL_HOST, port, "/restapis/spec/pythonFunction")
            .await
            .unwrap();
        mock.assert_async().await;
        assert!(out.action_succeeded);
        assert_eq!(out.action_output, Some(json!({"message": "Hello World"})));
    }

    #[tokio::test]
    async fn invoke_api_error_status_is_unsuccessful() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let port = server.socket_address().port();
        let out = invoke_api(LOCAL_HOST, port, "/missing").await.unwrap();
        assert!(!out.action_succeeded);
        assert_eq!(out.action_output, Some(Value::String("Bad Gateway".into())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_start_api_waits_for_readiness_then_invokes() {
        use std::os::unix::fs::PermissionsExt;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/restapis/spec/pythonFunction")
            .with_status(200)
            .with_body(r#"{"message": "Hello World"}"#)
            .create_async()
            .await;
        let port = server.socket_address().port();

        // Stand-in emulator: announces readiness on the requested port and idles.
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-sam");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             while [ \"$1\" != \"--port\" ]; do shift; done\n\
             echo \"Mounting function\" >&2\n\
             echo \"Running on http://127.0.0.1:$2/\" >&2\n\
             exec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let sam = SamCli::new(&script, Shell::default());
        let out = sam
            .local_start_api(
                Some(Path::new("cdk.out/T.template.json")),
                port,
                "/restapis/spec/pythonFunction",
                Duration::from_secs(10),
                &ShellOptions::default(),
            )
            .await
            .unwrap();

        assert!(out.action_succeeded);
        assert_eq!(out.action_output.unwrap()["message"], "Hello World");
        assert!(out.shell_output.contains("Mounting function"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_start_api_times_out_without_readiness() {
        let sam = SamCli::new("sh", Shell::default());
        // `sh local start-api ...` fails immediately: no such script file.
        let err = sam
            .local_start_api(None, 1, "/", Duration::from_secs(5), &ShellOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ExitedEarly { .. }));
    }
}
