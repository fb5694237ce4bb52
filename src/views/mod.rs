//! Server-rendered pages for the trap listing and dashboards.

use anyhow::Context;
use axum::response::Html;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::{
    domain::{CapturedRequest, Trap},
    errors::AppError,
};

const LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{{title}} · Lobster Trap</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <header><a href="/">🦞 Lobster Trap</a></header>
    <main>
{{> @partial-block}}
    </main>
    <script src="/static/app.js" defer></script>
</body>
</html>"#;

const INDEX: &str = r#"{{#> layout title="Traps"}}
<form method="post" action="/traps">
    <input type="text" name="name" maxlength="100" placeholder="Trap name (optional)">
    <button type="submit">Create trap</button>
</form>
{{#if traps}}
<table class="traps">
    <thead><tr><th>Name</th><th>Id</th><th>Requests</th><th>Created</th></tr></thead>
    <tbody>
    {{#each traps}}
        <tr>
            <td><a href="/traps/{{id}}">{{name}}</a></td>
            <td><code>{{id}}</code></td>
            <td>{{count}}</td>
            <td>{{created_at}}</td>
        </tr>
    {{/each}}
    </tbody>
</table>
{{else}}
<p class="empty">No traps yet. Create one to start catching requests.</p>
{{/if}}
{{/layout}}"#;

const DASHBOARD: &str = r#"{{#> layout title=trap.name}}
<h1>{{trap.name}}</h1>
<p>Send any request to <code>{{capture_url}}</code> (subpaths work too).</p>
<button data-delete="/traps/{{trap.id}}">Delete trap</button>
{{#if requests}}
{{#each requests}}
<section class="request">
    <h2><span class="method">{{method}}</span> <code>{{path}}</code></h2>
    <p>{{created_at}} from {{ip}}{{#if content_type}} · {{content_type}}{{/if}}</p>
    <h3>Headers</h3>
    <pre>{{headers}}</pre>
    <h3>Query</h3>
    <pre>{{query}}</pre>
    {{#if body}}<h3>Body</h3>
    <pre>{{body}}</pre>{{/if}}
</section>
{{/each}}
{{else}}
<p class="empty">Waiting for requests…</p>
{{/if}}
{{/layout}}"#;

const NOT_FOUND: &str = r#"{{#> layout title="Not found"}}
<h1>404</h1>
<p>Nothing lives here. <a href="/">Back to your traps</a>.</p>
{{/layout}}"#;

#[derive(Debug, Serialize)]
pub struct TrapSummary {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub count: i64,
}

impl TrapSummary {
    pub fn new(trap: Trap, count: i64) -> Self {
        Self {
            created_at: trap.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            id: trap.id,
            name: trap.name,
            count,
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestRow {
    method: String,
    path: String,
    headers: String,
    query: String,
    body: String,
    ip: String,
    content_type: String,
    created_at: String,
}

impl From<CapturedRequest> for RequestRow {
    fn from(request: CapturedRequest) -> Self {
        Self {
            headers: pretty(&request.headers),
            query: pretty(&request.query),
            created_at: request
                .created_at
                .format("%Y-%m-%d %H:%M:%S%.3f UTC")
                .to_string(),
            method: request.method,
            path: request.path,
            body: request.body,
            ip: request.ip,
            content_type: request.content_type,
        }
    }
}

fn pretty(blob: &str) -> String {
    serde_json::from_str::<serde_json::Value>(blob)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| blob.to_owned())
}

pub struct Views {
    registry: Handlebars<'static>,
}

impl Views {
    pub fn new() -> anyhow::Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_partial("layout", LAYOUT)
            .context("registering layout partial")?;
        registry
            .register_template_string("index", INDEX)
            .context("registering index template")?;
        registry
            .register_template_string("dashboard", DASHBOARD)
            .context("registering dashboard template")?;
        registry
            .register_template_string("404", NOT_FOUND)
            .context("registering 404 template")?;
        Ok(Self { registry })
    }

    pub fn index(&self, traps: &[TrapSummary]) -> Result<Html<String>, AppError> {
        Ok(Html(self.registry.render("index", &json!({ "traps": traps }))?))
    }

    pub fn dashboard(
        &self,
        trap: &Trap,
        requests: Vec<CapturedRequest>,
        base_url: &str,
    ) -> Result<Html<String>, AppError> {
        let rows: Vec<RequestRow> = requests.into_iter().map(RequestRow::from).collect();
        let data = json!({
            "trap": trap,
            "capture_url": format!("{base_url}/t/{}", trap.id),
            "requests": rows,
        });
        Ok(Html(self.registry.render("dashboard", &data)?))
    }

    pub fn not_found(&self) -> Result<Html<String>, AppError> {
        Ok(Html(self.registry.render("404", &json!({}))?))
    }
}
