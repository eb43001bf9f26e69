use axum::{extract::Extension, response::Html};

use crate::iplogin::{middleware::AutoLoginNotice, session::CurrentUser};

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Front page greeting the current visitor", content_type = "text/html")
    ),
    tag = "iplogin"
)]
pub async fn front(
    user: Option<Extension<CurrentUser>>,
    notice: Option<Extension<AutoLoginNotice>>,
) -> Html<String> {
    let greeting = match user {
        Some(Extension(CurrentUser(user_id))) => format!("Hello, user {user_id}."),
        None => "Hello, anonymous visitor.".to_string(),
    };
    let notice = notice.map_or_else(String::new, |_| {
        format!("<p class=\"notice\">{}</p>", AutoLoginNotice::MESSAGE)
    });
    Html(format!(
        "<!doctype html><html><body>{notice}<h1>{greeting}</h1></body></html>"
    ))
}
