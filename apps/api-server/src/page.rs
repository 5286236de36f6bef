//! Server-rendered single page: backend tabs, the create form and the list
//! fetched from the selected backend.
//!
//! Writes go through `POST /ui/...` and answer with a 303 back to `/`, so the
//! browser refetches the list after every create or delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use domain::validate::new_user_from_fields;
use domain::{Backend, RecordId, StoreError, UserRecord, UserService};
use http_common::{html_escape, system_time_to_rfc3339};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::AppState;

const MISSING_FIELDS_ALERT: &str = "Please fill in all fields";

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    backend: Option<String>,
}

/// Text of the create form as typed, kept when the page is re-rendered.
#[derive(Deserialize, Default)]
pub struct Draft {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    age: String,
}

impl Draft {
    fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.email.is_empty() && !self.age.is_empty()
    }
}

pub async fn index(State(state): State<AppState>, Query(q): Query<PageQuery>) -> Html<String> {
    let backend = q
        .backend
        .as_deref()
        .and_then(Backend::parse)
        .unwrap_or(Backend::Relational);
    let svc = state.service(backend);
    Html(render(svc, &fetch_or_empty(svc), &Draft::default(), None))
}

pub async fn create_from_form(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    Form(draft): Form<Draft>,
) -> Response {
    let Some(backend) = Backend::parse(&segment) else {
        return unknown_backend(&segment);
    };
    let svc = state.service(backend);

    if !draft.is_complete() {
        warn!(backend = backend.segment(), "form submitted with missing fields");
        let page = render(svc, &fetch_or_empty(svc), &draft, Some(MISSING_FIELDS_ALERT));
        return Html(page).into_response();
    }

    let created = new_user_from_fields(
        Some(draft.name.clone()),
        Some(draft.email.clone()),
        Some(draft.age.clone()),
    )
    .and_then(|input| svc.create(input));
    match created {
        Ok(user) => {
            info!(backend = backend.segment(), id = %user.id, "user created from page");
            Redirect::to(&index_path(backend)).into_response()
        }
        Err(e) => {
            error!(err=?e, backend = backend.segment(), "create from page failed");
            Html(render(svc, &fetch_or_empty(svc), &draft, None)).into_response()
        }
    }
}

pub async fn delete_from_form(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
) -> Response {
    let Some(backend) = Backend::parse(&segment) else {
        return unknown_backend(&segment);
    };
    match state.service(backend).remove(&RecordId::new(id.clone())) {
        Ok(_) => info!(backend = backend.segment(), id = %id, "user deleted from page"),
        Err(StoreError::NotFound) => {
            warn!(backend = backend.segment(), id = %id, "delete from page matched nothing")
        }
        Err(e) => {
            error!(err=?e, backend = backend.segment(), id = %id, "delete from page failed")
        }
    }
    Redirect::to(&index_path(backend)).into_response()
}

fn index_path(backend: Backend) -> String {
    format!("/?backend={}", backend.segment())
}

fn unknown_backend(segment: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(format!("<p>Unknown backend: {}</p>", html_escape(segment))),
    )
        .into_response()
}

// The page never shows fetch errors; the list simply renders empty.
fn fetch_or_empty(svc: &UserService) -> Vec<UserRecord> {
    svc.list().unwrap_or_else(|e| {
        error!(err=?e, backend = svc.backend().segment(), "list for page failed");
        Vec::new()
    })
}

fn render(svc: &UserService, users: &[UserRecord], draft: &Draft, alert: Option<&str>) -> String {
    let backend = svc.backend();
    let segment = backend.segment();

    let tabs: String = Backend::ALL
        .iter()
        .map(|b| {
            let class = if *b == backend { "tab active" } else { "tab" };
            format!(
                r#"<a class="{class}" href="{href}">{label}</a>"#,
                href = index_path(*b),
                label = b.kind_label()
            )
        })
        .collect();

    let alert_html = alert
        .map(|msg| format!(r#"<div class="alert" role="alert">{}</div>"#, html_escape(msg)))
        .unwrap_or_default();

    let list_html = if users.is_empty() {
        r#"<p class="empty">No users yet.</p>"#.to_string()
    } else {
        let rows: String = users
            .iter()
            .map(|u| {
                format!(
                    r#"<li>
                <div><strong>{name}</strong> <span class="muted">{email}</span> <span class="age">{age}</span></div>
                <div class="meta">id {id} &middot; created {created}</div>
                <form method="post" action="/ui/{segment}/users/{id}/delete"><button type="submit" class="danger">Delete</button></form>
            </li>"#,
                    name = html_escape(&u.name),
                    email = html_escape(&u.email),
                    age = u.age,
                    id = html_escape(u.id.as_str()),
                    created = system_time_to_rfc3339(u.created_at),
                )
            })
            .collect();
        format!(r#"<ul class="users">{rows}</ul>"#)
    };

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>SQL vs NoSQL Users</title>
    <style>
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #f8fafc;
            color: #1e293b;
            padding: 32px 16px;
        }}
        main {{ max-width: 720px; margin: 0 auto; }}
        h1 {{ font-size: 1.5rem; margin-bottom: 16px; }}
        .tabs {{ display: flex; gap: 8px; margin-bottom: 16px; }}
        .tab {{
            padding: 8px 20px;
            border-radius: 8px;
            text-decoration: none;
            color: #334155;
            background: #e2e8f0;
            font-weight: 600;
        }}
        .tab.active {{ background: #6366f1; color: white; }}
        .database {{ color: #64748b; font-size: 0.875rem; margin-bottom: 16px; }}
        .alert {{
            background: #fef2f2;
            border: 1px solid #fecaca;
            color: #b91c1c;
            border-radius: 8px;
            padding: 12px 16px;
            margin-bottom: 16px;
        }}
        .create {{ display: flex; gap: 8px; margin-bottom: 24px; flex-wrap: wrap; }}
        .create input {{
            flex: 1;
            min-width: 120px;
            padding: 10px 12px;
            border: 1px solid #cbd5e1;
            border-radius: 8px;
        }}
        button {{
            padding: 10px 18px;
            border: none;
            border-radius: 8px;
            background: #6366f1;
            color: white;
            font-weight: 600;
            cursor: pointer;
        }}
        button:disabled {{ opacity: 0.5; cursor: wait; }}
        button.danger {{ background: #ef4444; }}
        .users {{ list-style: none; }}
        .users li {{
            background: white;
            border: 1px solid #e2e8f0;
            border-radius: 8px;
            padding: 12px 16px;
            margin-bottom: 8px;
            display: grid;
            grid-template-columns: 1fr auto;
            gap: 4px 12px;
        }}
        .users li form {{ grid-row: 1 / span 2; grid-column: 2; align-self: center; }}
        .muted, .meta {{ color: #64748b; }}
        .meta {{ font-size: 0.75rem; }}
        .age {{ font-variant-numeric: tabular-nums; }}
        .empty {{ color: #94a3b8; }}
    </style>
</head>
<body data-loading="false">
<main>
    <h1>SQL vs NoSQL Users</h1>
    <nav class="tabs">{tabs}</nav>
    <p class="database">Backend: {database} ({kind})</p>
    {alert_html}
    <form class="create" method="post" action="/ui/{segment}/users">
        <input name="name" placeholder="Name" value="{name}">
        <input name="email" type="email" placeholder="Email" value="{email}">
        <input name="age" type="number" placeholder="Age" value="{age}">
        <button type="submit">Add User</button>
    </form>
    {list_html}
</main>
<script>
    document.querySelectorAll('form').forEach(function (form) {{
        form.addEventListener('submit', function () {{
            document.body.dataset.loading = 'true';
            setTimeout(function () {{
                document.querySelectorAll('button').forEach(function (b) {{ b.disabled = true; }});
            }}, 0);
        }});
    }});
</script>
</body>
</html>"##,
        database = html_escape(svc.database()),
        kind = backend.kind_label(),
        name = html_escape(&draft.name),
        email = html_escape(&draft.email),
        age = html_escape(&draft.age),
    )
}
