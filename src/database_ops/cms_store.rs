use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::debug;

use super::records::{GameRecord, NewGame, NewTaxonomy, TaxonomyKind, TaxonomyRecord};
use super::store::RecordStore;
use crate::error::{truncate_body, StoreError};

const GAMES_COLLECTION: &str = "games";
/// Lowercased fragments the CMS puts in 400 bodies for unique-field violations.
const UNIQUE_VIOLATION_MARKERS: [&str; 4] = ["unique", "duplicate", "already taken", "already exists"];

/// Record store backed by the CMS content REST API.
///
/// Collections live at `{base}/{collection}`; `GET ?name=..&_limit=1` returns an array and `POST`
/// returns the created entity. A 409, or a 400 whose body reports a unique-field violation, is
/// treated as "name already taken"; every other 400 is a rejected create.
#[derive(Clone)]
pub struct CmsStore {
    client: Client,
    base_url: String,
}

impl CmsStore {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Value>, StoreError> {
        let url = self.collection_url(collection);
        let response = self
            .client
            .get(&url)
            .query(&[(field, value), ("_limit", "1")])
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                operation: format!("find {collection}"),
                status: status.as_u16(),
                detail,
            });
        }
        let rows: Vec<Value> = response.json().await.map_err(|e| StoreError::Payload {
            operation: format!("find {collection}"),
            detail: e.to_string(),
        })?;
        Ok(rows.into_iter().next())
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<Option<Value>, StoreError> {
        let url = self.collection_url(collection);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| StoreError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            if is_unique_violation(status, &detail) {
                debug!(collection, status = status.as_u16(), detail = %detail, "cms create conflicted");
                return Ok(None);
            }
            return Err(StoreError::Rejected {
                operation: format!("create {collection}"),
                status: status.as_u16(),
                detail: truncate_body(&detail),
            });
        }
        let created: Value = response.json().await.map_err(|e| StoreError::Payload {
            operation: format!("create {collection}"),
            detail: e.to_string(),
        })?;
        Ok(Some(created))
    }
}

/// 409, or a 400 whose body names a uniqueness failure. Any other 400 is a validation error.
fn is_unique_violation(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::CONFLICT {
        return true;
    }
    if status != StatusCode::BAD_REQUEST {
        return false;
    }
    let body = body.to_ascii_lowercase();
    UNIQUE_VIOLATION_MARKERS
        .iter()
        .any(|marker| body.contains(marker))
}

fn id_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        Value::Object(map) => map.get("id").and_then(id_of),
        _ => None,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn taxonomy_from_value(collection: &str, value: &Value) -> Result<TaxonomyRecord, StoreError> {
    let payload_error = |detail: &str| StoreError::Payload {
        operation: format!("decode {collection}"),
        detail: detail.to_string(),
    };
    Ok(TaxonomyRecord {
        id: id_of(value).ok_or_else(|| payload_error("missing id"))?,
        name: str_field(value, "name").ok_or_else(|| payload_error("missing name"))?,
        slug: str_field(value, "slug").unwrap_or_default(),
    })
}

fn game_from_value(value: &Value) -> Result<GameRecord, StoreError> {
    let payload_error = |detail: &str| StoreError::Payload {
        operation: "decode games".into(),
        detail: detail.to_string(),
    };
    let id = id_of(value).ok_or_else(|| payload_error("missing id"))?;
    let price = match value.get("price") {
        Some(Value::Number(n)) => BigDecimal::from_str(&n.to_string()).ok(),
        Some(Value::String(s)) => BigDecimal::from_str(s).ok(),
        _ => None,
    };
    let release_date = value
        .get("release_date")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    let mut fields = NewGame {
        name: str_field(value, "name").ok_or_else(|| payload_error("missing name"))?,
        slug: str_field(value, "slug").unwrap_or_default(),
        price,
        release_date,
        short_description: str_field(value, "short_description"),
        description: str_field(value, "description"),
        ..NewGame::default()
    };
    for kind in TaxonomyKind::ALL {
        if let Some(Value::Array(items)) = value.get(kind.collection()) {
            *fields.relations_mut(kind) = items.iter().filter_map(id_of).collect();
        }
    }
    Ok(GameRecord { id, fields })
}

fn game_body(game: &NewGame) -> Value {
    json!({
        "name": game.name,
        "slug": game.slug,
        "price": game.price.as_ref().map(|p| p.to_string()),
        "release_date": game.release_date.map(|d| d.to_rfc3339()),
        "short_description": game.short_description,
        "description": game.description,
        "categories": game.categories,
        "platforms": game.platforms,
        "developers": game.developers,
        "publishers": game.publishers,
    })
}

#[async_trait]
impl RecordStore for CmsStore {
    fn backend(&self) -> &'static str {
        "cms"
    }

    async fn find_taxonomy(
        &self,
        kind: TaxonomyKind,
        name: &str,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        self.find_one(kind.collection(), "name", name)
            .await?
            .map(|v| taxonomy_from_value(kind.collection(), &v))
            .transpose()
    }

    async fn find_taxonomy_by_slug(
        &self,
        kind: TaxonomyKind,
        slug: &str,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        self.find_one(kind.collection(), "slug", slug)
            .await?
            .map(|v| taxonomy_from_value(kind.collection(), &v))
            .transpose()
    }

    async fn insert_taxonomy(
        &self,
        kind: TaxonomyKind,
        new: &NewTaxonomy,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        let body = json!({ "name": new.name, "slug": new.slug });
        self.create(kind.collection(), &body)
            .await?
            .map(|v| taxonomy_from_value(kind.collection(), &v))
            .transpose()
    }

    async fn find_game(&self, name: &str) -> Result<Option<GameRecord>, StoreError> {
        self.find_one(GAMES_COLLECTION, "name", name)
            .await?
            .map(|v| game_from_value(&v))
            .transpose()
    }

    async fn insert_game(&self, game: &NewGame) -> Result<Option<GameRecord>, StoreError> {
        self.create(GAMES_COLLECTION, &game_body(game))
            .await?
            .map(|v| game_from_value(&v))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_populated_game_payload() {
        let payload = json!({
            "id": 7,
            "name": "Foo Bar",
            "slug": "foo_bar",
            "price": 9.99,
            "release_date": "2020-01-01T00:00:00.000Z",
            "categories": [{"id": 1, "name": "Action"}],
            "platforms": [2],
            "developers": ["3"],
            "publishers": []
        });
        let game = game_from_value(&payload).unwrap();
        assert_eq!(game.id, 7);
        assert_eq!(game.slug(), "foo_bar");
        assert_eq!(game.fields.price, BigDecimal::from_str("9.99").ok());
        assert_eq!(game.fields.categories, vec![1]);
        assert_eq!(game.fields.platforms, vec![2]);
        assert_eq!(game.fields.developers, vec![3]);
        assert!(game.fields.publishers.is_empty());
        assert!(game.fields.release_date.is_some());
    }

    #[test]
    fn game_body_sends_relation_ids_and_decimal_price() {
        let game = NewGame {
            name: "Foo Bar".into(),
            slug: "foo_bar".into(),
            price: BigDecimal::from_str("9.99").ok(),
            categories: vec![1, 2],
            ..NewGame::default()
        };
        let body = game_body(&game);
        assert_eq!(body["price"], json!("9.99"));
        assert_eq!(body["categories"], json!([1, 2]));
        assert_eq!(body["short_description"], Value::Null);
    }

    #[test]
    fn taxonomy_without_id_is_a_payload_error() {
        let err = taxonomy_from_value("developers", &json!({"name": "Acme"})).unwrap_err();
        assert!(matches!(err, StoreError::Payload { .. }));
    }

    type Route = (&'static str, &'static str, u16, &'static str);

    /// Minimal HTTP/1.1 responder: first route whose method matches and whose path is a prefix
    /// of the request path answers; anything else gets a 404.
    async fn serve(routes: Vec<Route>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let head_end = loop {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos + 4;
                        }
                    };
                    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                    let content_length = head
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    while buf.len() < head_end + content_length {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }

                    let mut request_line = head.split_whitespace();
                    let method = request_line.next().unwrap_or_default();
                    let path = request_line.next().unwrap_or_default();
                    let (status, body) = routes
                        .iter()
                        .find(|(m, p, _, _)| *m == method && path.starts_with(p))
                        .map(|(_, _, status, body)| (*status, *body))
                        .unwrap_or((404, "{}"));
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    fn foo_bar() -> NewGame {
        NewGame {
            name: "Foo Bar".into(),
            slug: "foo_bar".into(),
            ..NewGame::default()
        }
    }

    #[test]
    fn only_uniqueness_failures_count_as_conflicts() {
        assert!(is_unique_violation(StatusCode::CONFLICT, ""));
        assert!(is_unique_violation(
            StatusCode::BAD_REQUEST,
            r#"{"message":"ValidationError","data":{"errors":{"name":["name must be unique"]}}}"#
        ));
        assert!(is_unique_violation(StatusCode::BAD_REQUEST, "Duplicate entry 'Acme'"));
        assert!(!is_unique_violation(
            StatusCode::BAD_REQUEST,
            r#"{"message":"ValidationError","data":{"errors":{"price":["price must be a number"]}}}"#
        ));
        assert!(!is_unique_violation(StatusCode::INTERNAL_SERVER_ERROR, "unique"));
    }

    #[tokio::test]
    async fn validation_error_on_create_is_a_rejection_with_detail() {
        let base = serve(vec![
            ("GET", "/games", 200, "[]"),
            (
                "POST",
                "/games",
                400,
                r#"{"statusCode":400,"error":"Bad Request","message":"ValidationError: categories.0 not found"}"#,
            ),
        ])
        .await;
        let store = CmsStore::new(local_client(), &base);

        assert_eq!(store.find_game("Foo Bar").await.unwrap(), None);
        let err = store.insert_game(&foo_bar()).await.unwrap_err();
        match err {
            StoreError::Rejected { status, detail, .. } => {
                assert_eq!(status, 400);
                assert!(detail.contains("categories.0 not found"), "{detail}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unique_violation_on_create_means_name_taken() {
        let base = serve(vec![(
            "POST",
            "/developers",
            400,
            r#"{"message":"ValidationError","data":{"errors":{"name":["name must be unique"]}}}"#,
        )])
        .await;
        let store = CmsStore::new(local_client(), &base);
        let new = NewTaxonomy {
            name: "Acme".into(),
            slug: "acme".into(),
        };
        assert_eq!(
            store
                .insert_taxonomy(TaxonomyKind::Developer, &new)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn created_entity_is_decoded() {
        let base = serve(vec![(
            "POST",
            "/games",
            200,
            r#"{"id": 12, "name": "Foo Bar", "slug": "foo_bar", "categories": []}"#,
        )])
        .await;
        let store = CmsStore::new(local_client(), &base);
        let created = store.insert_game(&foo_bar()).await.unwrap().unwrap();
        assert_eq!(created.game_ref().id, 12);
    }

    #[test]
    fn collection_urls_ignore_trailing_slash() {
        let store = CmsStore::new(Client::new(), "http://localhost:1337/");
        assert_eq!(
            store.collection_url("developers"),
            "http://localhost:1337/developers"
        );
    }
}
