use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::{CatalogPage, RawProduct};
use crate::error::PopulateError;
use crate::util::http::{fetch_json, Fetcher};

/// Catalog query parameters, forwarded verbatim and in order.
pub type CatalogParams = IndexMap<String, String>;

/// Client for the storefront catalog listing.
#[derive(Clone)]
pub struct CatalogClient {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
}

impl CatalogClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.to_string(),
        }
    }

    pub fn request_url(&self, params: &CatalogParams) -> Result<String, PopulateError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| PopulateError::RemoteApi {
            url: self.base_url.clone(),
            status: None,
            detail: format!("invalid catalog url: {e}"),
        })?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    /// One catalog query; the remote API decides paging and filtering.
    pub async fn fetch_catalog(
        &self,
        params: &CatalogParams,
    ) -> Result<Vec<RawProduct>, PopulateError> {
        let url = self.request_url(params)?;
        info!(url = %url, "catalog: requesting");
        let page: CatalogPage = fetch_json(self.fetcher.as_ref(), &url).await?;

        if let Some(first) = page.products.first() {
            debug!(product = ?first, "catalog: first product");
        }
        info!(
            products = page.products.len(),
            pages = ?page.pages,
            product_count = ?page.product_count,
            "catalog: fetched"
        );
        Ok(page.products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::http::testing::StaticFetcher;

    const BASE: &str = "https://catalog.test/v1/catalog";

    fn params(pairs: &[(&str, &str)]) -> CatalogParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn params_are_encoded_in_order() {
        let client = CatalogClient::new(Arc::new(StaticFetcher::new()), BASE);
        let url = client
            .request_url(&params(&[("limit", "48"), ("order", "desc:trending")]))
            .unwrap();
        assert_eq!(url, format!("{BASE}?limit=48&order=desc%3Atrending"));
        assert_eq!(client.request_url(&CatalogParams::new()).unwrap(), BASE);
    }

    #[tokio::test]
    async fn fetches_products_from_the_listing() {
        let url = format!("{BASE}?limit=1");
        let body = r#"{"pages": 3, "products": [{"title": "Foo Bar", "slug": "foo-bar"}]}"#;
        let fetcher = Arc::new(StaticFetcher::new().with(&url, 200, body));
        let client = CatalogClient::new(fetcher.clone(), BASE);

        let products = client.fetch_catalog(&params(&[("limit", "1")])).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].title, "Foo Bar");
        assert_eq!(fetcher.requested(), vec![url]);
    }

    #[tokio::test]
    async fn remote_failures_surface_as_remote_api_errors() {
        let url = format!("{BASE}?limit=1");
        let fetcher = Arc::new(StaticFetcher::new().with(&url, 503, "maintenance"));
        let client = CatalogClient::new(fetcher, BASE);

        let err = client
            .fetch_catalog(&params(&[("limit", "1")]))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), Some(503));
    }
}
