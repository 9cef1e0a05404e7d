use std::io::{IsTerminal, Write};

use base64::Engine;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpctunnel_http::FetchResponse;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    status: u16,
    ok: bool,
    headers: &'a std::collections::BTreeMap<String, String>,
    body: Option<String>,
    #[serde(rename = "bodyEncoding", skip_serializing_if = "Option::is_none")]
    body_encoding: Option<&'static str>,
}

pub fn print_response(response: &FetchResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let (body, body_encoding) = body_for_json(response);
            let out = ResponseOutput {
                status: response.status(),
                ok: response.ok(),
                headers: response.headers(),
                body,
                body_encoding,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["status".to_string(), response.status().to_string()]);
            for (name, value) in response.headers() {
                table.add_row(vec![format!("header {name}"), value.clone()]);
            }
            table.add_row(vec!["body".to_string(), body_preview(response)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("HTTP {}", response.status());
            for (name, value) in response.headers() {
                println!("{name}: {value}");
            }
            if response.has_body() {
                println!();
                println!("{}", body_preview(response));
            }
        }
        OutputFormat::Raw => print_raw(&response.bytes()),
    }
}

pub fn print_result(method: &str, result: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{result}"),
        OutputFormat::Pretty => println!(
            "{}",
            serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "RESULT"])
                .add_row(vec![method.to_string(), result.to_string()]);
            println!("{table}");
        }
        OutputFormat::Raw => match result {
            Value::String(text) => print_raw(text.as_bytes()),
            other => print_raw(other.to_string().as_bytes()),
        },
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn body_for_json(response: &FetchResponse) -> (Option<String>, Option<&'static str>) {
    if !response.has_body() {
        return (None, None);
    }
    let bytes = response.bytes();
    match std::str::from_utf8(&bytes) {
        Ok(text) => (Some(text.to_string()), None),
        Err(_) => (
            Some(base64::engine::general_purpose::STANDARD.encode(&bytes)),
            Some("base64"),
        ),
    }
}

fn body_preview(response: &FetchResponse) -> String {
    let bytes = response.bytes();
    match std::str::from_utf8(&bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", bytes.len()),
    }
}
