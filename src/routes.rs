//! Informational HTTP routes served next to the business routes.

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::ConfigProvider;
use crate::core::Result;

pub const NAMESPACE: &str = "/process_engine";
pub const AUTHORITY_ROUTE: &str = "/security/authority";
pub const IAM_CONFIG_KEY: &str = "iam:iam_service";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub license: String,
    pub homepage: String,
    pub authors: Vec<String>,
}

impl ApplicationInfo {
    /// Metadata of this build.
    pub fn from_package() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: env!("CARGO_PKG_DESCRIPTION").to_string(),
            license: env!("CARGO_PKG_LICENSE").to_string(),
            homepage: env!("CARGO_PKG_HOMEPAGE").to_string(),
            authors: env!("CARGO_PKG_AUTHORS")
                .split(':')
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorityInfo {
    pub authority: Option<String>,
}

impl AuthorityInfo {
    /// `basePath` of the identity service section; env overrides already applied.
    pub fn from_config(config: &ConfigProvider) -> Result<Self> {
        let section = config.section(IAM_CONFIG_KEY)?;
        Ok(Self {
            authority: section
                .get("basePath")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
        })
    }
}

/// `GET /process_engine` and `GET /process_engine/security/authority`, plus the same
/// two at the root when `use_root_routes` is set.
pub fn informational_routes(
    info: ApplicationInfo,
    authority: AuthorityInfo,
    use_root_routes: bool,
) -> Router {
    let info_handler = {
        let info = info.clone();
        move || async move { Json(info) }
    };
    let authority_handler = {
        let authority = authority.clone();
        move || async move { Json(authority) }
    };

    let mut router = Router::new()
        .route(NAMESPACE, get(info_handler.clone()))
        .route(
            &format!("{}{}", NAMESPACE, AUTHORITY_ROUTE),
            get(authority_handler.clone()),
        );

    if use_root_routes {
        router = router
            .route("/", get(info_handler))
            .route(AUTHORITY_ROUTE, get(authority_handler));
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn authority() -> AuthorityInfo {
        AuthorityInfo {
            authority: Some("http://localhost:5000".to_string()),
        }
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, JsonValue) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value = if body.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_namespaced_routes() {
        let router = informational_routes(ApplicationInfo::from_package(), authority(), false);

        let (status, body) = get_json(router.clone(), "/process_engine").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], json!("processengine_runtime"));
        assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));

        let (status, body) = get_json(router.clone(), "/process_engine/security/authority").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"authority": "http://localhost:5000"}));

        let (status, _) = get_json(router, "/security/authority").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_root_routes_when_enabled() {
        let router = informational_routes(ApplicationInfo::from_package(), authority(), true);

        let (status, body) = get_json(router.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], json!("processengine_runtime"));

        let (status, body) = get_json(router, "/security/authority").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["authority"], json!("http://localhost:5000"));
    }

    #[test]
    fn test_authority_comes_from_iam_section_with_override() {
        use crate::config::ResolvedEnvironment;

        let root = tempfile::tempdir().unwrap();
        let iam = root.path().join("sqlite").join("iam");
        std::fs::create_dir_all(&iam).unwrap();
        std::fs::write(iam.join("iam_service.json"), r#"{"basePath": "http://iam:5000"}"#).unwrap();
        let environment = ResolvedEnvironment {
            name: "sqlite".to_string(),
            config_root: root.path().to_path_buf(),
        };

        let plain = ConfigProvider::new(&environment, Default::default());
        assert_eq!(
            AuthorityInfo::from_config(&plain).unwrap().authority.as_deref(),
            Some("http://iam:5000")
        );

        let overridden = plain.with_overrides(
            &[(
                "iam__iam_service__basePath".to_string(),
                "https://auth.example".to_string(),
            )]
            .into_iter()
            .collect(),
        );
        assert_eq!(
            AuthorityInfo::from_config(&overridden).unwrap().authority.as_deref(),
            Some("https://auth.example")
        );
    }
}
