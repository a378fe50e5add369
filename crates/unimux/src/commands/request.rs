//! Resource verbs: get, create, update, delete.

use std::time::Duration;

use serde_json::Value;
use unimux_api::{ApiResponse, Client, Request};

use crate::cli::{DeleteArgs, GetArgs, GlobalOpts, WriteArgs};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Parse `--data`: inline JSON, or `@path` to read the body from a file.
pub fn parse_body(data: &str) -> Result<Value, CliError> {
    let text = match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => data.to_owned(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn emit(response: &ApiResponse, global: &GlobalOpts) -> Result<(), CliError> {
    let rendered = output::render(global.output, response)?;
    output::print_output(&rendered);
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn get(
    client: &Client,
    site: &str,
    args: GetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut req = Request::get(args.resource, site);
    if let Some(id) = args.id {
        req = req.id(id);
    }
    for (key, value) in args.params {
        req = req.param(key, value);
    }
    if let Some(secs) = args.ttl {
        req = req.ttl(Duration::from_secs(secs));
    }
    emit(&client.request(req).await?, global)
}

pub async fn create(
    client: &Client,
    site: &str,
    args: WriteArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut req = Request::post(args.resource, site).body(parse_body(&args.data)?);
    if let Some(id) = args.id {
        req = req.id(id);
    }
    emit(&client.request(req).await?, global)
}

pub async fn update(
    client: &Client,
    site: &str,
    args: WriteArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = args.id.ok_or_else(|| CliError::Validation {
        field: "id".into(),
        reason: "update needs --id".into(),
    })?;
    let body = parse_body(&args.data)?;
    let response = client.put(&args.resource, site, &id, body).await?;
    emit(&response, global)
}

pub async fn delete(
    client: &Client,
    site: &str,
    args: &DeleteArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let response = client.delete(&args.resource, site, &args.id).await?;
    emit(&response, global)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn body_is_inline_json_or_file() {
        assert_eq!(parse_body(r#"{"name":"iot"}"#).unwrap(), json!({"name": "iot"}));

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("body.json");
        std::fs::write(&path, r#"{"vlanId": 20}"#).unwrap();
        let arg = format!("@{}", path.display());
        assert_eq!(parse_body(&arg).unwrap(), json!({"vlanId": 20}));
    }

    #[test]
    fn malformed_body_is_a_json_error() {
        assert!(matches!(parse_body("{nope"), Err(CliError::Json(_))));
        assert!(matches!(
            parse_body("@/definitely/not/here.json"),
            Err(CliError::Io(_))
        ));
    }
}
