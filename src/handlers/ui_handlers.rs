use axum::response::Html;

static INDEX_HTML: &str = include_str!("../../assets/index.html");

/// `GET /`: static UI shell; everything dynamic is fetched from the JSON API.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
