use crate::{
    cache::QueryCache,
    error::{BackendError, HookError},
    models::{BlogPost, PortfolioItem, Record, Service},
    reader::ContentQuery,
    repository::{CREATED_AT, QueryOptions, StoreState},
};

/// Content
///
/// The typed public queries behind the site's pages. Each call mounts a fresh
/// `ContentQuery` and returns what it settled on.
#[derive(Clone)]
pub struct Content {
    store: StoreState,
    cache: Option<QueryCache>,
}

impl Content {
    pub fn new(store: StoreState, cache: Option<QueryCache>) -> Self {
        Self { store, cache }
    }

    async fn list<T: Record + Clone>(&self, options: QueryOptions) -> Result<Vec<T>, HookError> {
        let query = ContentQuery::<T>::new(self.store.clone(), self.cache.clone(), options);
        query.mount().await;
        query.state().into_result().map(|records| records.into_list())
    }

    async fn by_slug<T: Record + Clone>(&self, slug: &str) -> Result<T, HookError> {
        let options = QueryOptions::new().eq("slug", slug).single();
        let query = ContentQuery::<T>::new(self.store.clone(), self.cache.clone(), options);
        query.mount().await;
        query
            .state()
            .into_result()?
            .into_single()
            .ok_or_else(|| HookError::from(BackendError::NotFound { table: T::TABLE }))
    }

    pub async fn portfolios(&self) -> Result<Vec<PortfolioItem>, HookError> {
        self.list(QueryOptions::new()).await
    }

    pub async fn portfolios_by_category(&self, category: &str) -> Result<Vec<PortfolioItem>, HookError> {
        self.list(QueryOptions::new().eq("category", category)).await
    }

    /// The newest `limit` published case studies, for the home page.
    pub async fn featured_portfolios(&self, limit: usize) -> Result<Vec<PortfolioItem>, HookError> {
        self.list(QueryOptions::new().limit(limit)).await
    }

    pub async fn portfolio_by_slug(&self, slug: &str) -> Result<PortfolioItem, HookError> {
        self.by_slug(slug).await
    }

    /// Number of published case studies.
    pub async fn published_portfolio_count(&self) -> Result<usize, HookError> {
        let rows: Vec<PortfolioItem> = self.list(QueryOptions::new().select("id")).await?;
        Ok(rows.len())
    }

    /// Services in the order they were added.
    pub async fn services(&self) -> Result<Vec<Service>, HookError> {
        self.list(QueryOptions::new().order(CREATED_AT, true)).await
    }

    pub async fn service_by_slug(&self, slug: &str) -> Result<Service, HookError> {
        self.by_slug(slug).await
    }

    pub async fn blog_posts(&self) -> Result<Vec<BlogPost>, HookError> {
        self.list(QueryOptions::new()).await
    }

    pub async fn blog_posts_by_category(&self, category: &str) -> Result<Vec<BlogPost>, HookError> {
        self.list(QueryOptions::new().eq("category", category)).await
    }

    pub async fn latest_posts(&self, limit: usize) -> Result<Vec<BlogPost>, HookError> {
        self.list(QueryOptions::new().limit(limit)).await
    }

    pub async fn blog_post_by_slug(&self, slug: &str) -> Result<BlogPost, HookError> {
        self.by_slug(slug).await
    }
}
