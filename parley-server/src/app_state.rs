// Application state shared across all routes.
#[derive(Clone, Default)]
pub struct AppState {
    pub(crate) pool: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(pool: Option<sqlx::PgPool>) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pool", &self.pool.is_some())
            .finish()
    }
}
