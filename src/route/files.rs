use std::path::PathBuf;

use rocket::fs::NamedFile;
use rocket::State;

use crate::config::Config;

/// The single-page app entry point, if one is deployed.
pub async fn app_index_file(c: &Config) -> Option<NamedFile> {
    let index = c.public_content.join("index.html");
    match NamedFile::open(&index).await {
        Ok(file) => Some(file),
        Err(_) => {
            tracing::warn!("'{}' does not exist", index.display());
            None
        }
    }
}

/// Serve the web app
#[utoipa::path(responses(
    (status = 200, description = "Web app entry point", content_type = "text/html"),
    (status = 404, description = "No web app is deployed"),
))]
#[get("/")]
pub async fn app(c: &State<Config>) -> Option<NamedFile> {
    app_index_file(c).await
}

/// Static content, falling back to the app's index so client-side routes resolve.
#[get("/<path..>", rank = 10)]
pub async fn app_path(path: PathBuf, c: &State<Config>) -> Option<NamedFile> {
    match NamedFile::open(c.public_content.join(path)).await {
        Ok(file) => Some(file),
        Err(_) => app_index_file(c).await,
    }
}

#[cfg(test)]
mod file_endpoints {
    use rocket::http::Status;

    use crate::route::testing::*;

    #[rocket::async_test]
    async fn missing_app_is_not_found() {
        let client = client().await;
        let response = client.get("/some/client/route").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
