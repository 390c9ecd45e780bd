//! Server rendered HTML pages.

use super::{ApiError, AppState};
use crate::domain::areatypes::{area_type, KEY_AREA_TYPES};
use crate::query::service::{PostcodeResult, SearchItem, DEFAULT_SEARCH_SIZE};
use crate::query::{FieldSet, Shape};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use std::fmt::Write;

const SITE_NAME: &str = "Find that Postcode";

/// Index 0 and 7 are unused.
const GRID_QUALITY: &[&str] = &[
    "",
    "within the building of the matched address closest to the postcode mean",
    "as for status value 1, except by visual inspection of Landline maps (Scotland only)",
    "approximate to within 50 metres",
    "postcode unit mean (mean of matched addresses with the same postcode, but not snapped to a building)",
    "imputed by ONS, by reference to surrounding postcode grid references",
    "postcode sector mean, (mainly PO Boxes)",
    "",
    "postcode terminated prior to Gridlink(R) initiative, last known ONS postcode grid reference",
    "no grid reference available",
];

const USER_TYPES: &[&str] = &["Small user", "Large user"];

/// Number of ranked LSOAs (or data zones) per country, for IMD ranks.
const IMD_RANKS: &[(&str, u32)] = &[
    ("E92000001", 32844),
    ("W92000004", 1909),
    ("S92000003", 6976),
];

pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title} | {site}</title>\n</head>\n<body>\n<header><a href=\"/\">{site}</a></header>\n<main>\n{body}\n</main>\n</body>\n</html>\n",
        title = escape(title),
        site = SITE_NAME,
        body = body
    )
}

fn search_form(q: &str) -> String {
    format!(
        "<form action=\"/search/\" method=\"get\"><input type=\"search\" name=\"q\" value=\"{}\" placeholder=\"Postcode, area or place\"><button type=\"submit\">Search</button></form>",
        escape(q)
    )
}

fn error_page(err: ApiError) -> Response {
    let status = err.status();
    let message = if status == StatusCode::NOT_FOUND {
        err.0.to_string()
    } else {
        err.0.user_friendly_message()
    };
    let body = format!("<h1>{}</h1>\n<p>{}</p>", status, escape(&message));
    (status, Html(layout("Error", &body))).into_response()
}

pub async fn index() -> Html<String> {
    let body = format!(
        "<h1>{}</h1>\n<p>Look up UK postcodes, areas and places.</p>\n{}",
        SITE_NAME,
        search_form("")
    );
    Html(layout("Home", &body))
}

fn render_postcode(result: &PostcodeResult) -> String {
    let postcode = &result.postcode;
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", escape(postcode.id()));
    if let Some(doterm) = postcode.doterm {
        let _ = writeln!(
            body,
            "<p class=\"terminated\">This postcode was terminated in {}.</p>",
            doterm.format("%B %Y")
        );
    }
    if let (Some(lat), Some(long)) = (postcode.lat, postcode.long) {
        let _ = writeln!(body, "<p>Latitude {:.6}, longitude {:.6}</p>", lat, long);
    }
    if let Some(description) = postcode
        .usertype
        .and_then(|u| USER_TYPES.get(usize::try_from(u).ok()?))
    {
        let _ = writeln!(body, "<p>{}</p>", description);
    }
    if let Some(quality) = postcode
        .osgrdind
        .and_then(|g| GRID_QUALITY.get(usize::try_from(g).ok()?))
        .filter(|q| !q.is_empty())
    {
        let _ = writeln!(body, "<p>Location accuracy: {}</p>", quality);
    }
    if let Some(imd) = postcode.imd {
        let country = postcode.codes.get("ctry").map(String::as_str);
        match IMD_RANKS.iter().find(|(code, _)| Some(*code) == country) {
            Some((_, total)) => {
                let _ = writeln!(body, "<p>Index of Multiple Deprivation rank {} of {}</p>", imd, total);
            }
            None => {
                let _ = writeln!(body, "<p>Index of Multiple Deprivation rank {}</p>", imd);
            }
        }
    }

    for (group, types) in KEY_AREA_TYPES {
        let rows: Vec<String> = types
            .iter()
            .filter_map(|t| {
                let code = postcode.codes.get(*t)?;
                let label = area_type(t).map(|a| a.name).unwrap_or(*t);
                let name = result
                    .names
                    .get(&format!("{}_name", t))
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| code.clone());
                Some(format!(
                    "<tr><th>{}</th><td><a href=\"/areas/{}.json\">{}</a></td><td><code>{}</code></td></tr>",
                    escape(label),
                    escape(code),
                    escape(&name),
                    escape(code)
                ))
            })
            .collect();
        if rows.is_empty() {
            continue;
        }
        let _ = writeln!(
            body,
            "<h2>{}</h2>\n<table>\n{}\n</table>",
            escape(group),
            rows.join("\n")
        );
    }
    body
}

/// GET /postcodes/{code}.html
pub async fn postcode(state: &AppState, code: &str) -> Response {
    match state
        .service
        .get_postcode(code, &FieldSet::all(Shape::Postcode))
        .await
    {
        Ok(result) => Html(layout(result.postcode.id(), &render_postcode(&result))).into_response(),
        Err(e) => error_page(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub q: String,
}

fn item_link(item: &SearchItem) -> String {
    match item {
        SearchItem::Postcode(p) => format!("/postcodes/{}.html", p.postcode.id()),
        SearchItem::Area(a) => format!("/areas/{}.json", a.area.code),
        SearchItem::Place(p) => format!("/places/{}.json", p.place18cd),
    }
}

fn item_kind(item: &SearchItem) -> String {
    match item {
        SearchItem::Postcode(_) => "Postcode".to_string(),
        SearchItem::Area(a) => a
            .areatype
            .map(|t| t.name.to_string())
            .unwrap_or_else(|| "Area".to_string()),
        SearchItem::Place(p) => match &p.place_type {
            Some(kind) => format!("Place - {}", kind),
            None => "Place".to_string(),
        },
    }
}

/// GET /search/?q=
pub async fn search(State(state): State<AppState>, Query(params): Query<SearchPage>) -> Response {
    let q = params.q.trim();
    let mut body = format!("<h1>Search</h1>\n{}\n", search_form(q));
    if q.is_empty() {
        return Html(layout("Search", &body)).into_response();
    }

    let outcome = match state.service.search(q, DEFAULT_SEARCH_SIZE).await {
        Ok(outcome) => outcome,
        Err(e) => return error_page(e.into()),
    };
    let _ = writeln!(
        body,
        "<p>{} results for <strong>{}</strong></p>\n<ul>",
        outcome.result_count,
        escape(q)
    );
    for item in &outcome.result {
        let _ = writeln!(
            body,
            "<li><a href=\"{}\">{}</a> <small>{}</small></li>",
            escape(&item_link(item)),
            escape(item.name()),
            escape(&item_kind(item))
        );
    }
    body.push_str("</ul>");
    Html(layout(&format!("Search: {}", q), &body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<script>alert('x & y')</script>"),
            "&lt;script&gt;alert(&#39;x &amp; y&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_layout_escapes_title() {
        let page = layout("<b>", "<p>ok</p>");
        assert!(page.contains("<title>&lt;b&gt; | Find that Postcode</title>"));
        assert!(page.contains("<p>ok</p>"));
    }
}
