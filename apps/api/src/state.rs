//! Shared handler state.

use std::sync::Arc;

use apotek_core::validation::{DefaultValidator, PayloadValidator};
use apotek_db::Database;

use crate::auth::JwtManager;
use crate::config::ApiConfig;
use crate::pdf::{PdfEngine, PrintPdfEngine};

/// Cloned into every handler by axum.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub jwt: Arc<JwtManager>,
    pub config: Arc<ApiConfig>,
    pub pdf: Arc<dyn PdfEngine>,
    pub validator: Arc<dyn PayloadValidator>,
}

impl AppState {
    /// State with the printpdf engine and the default payload rules.
    pub fn new(db: Database, config: ApiConfig) -> Self {
        let jwt = JwtManager::new(config.jwt_secret.clone(), config.jwt_expiry_secs);

        AppState {
            db,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
            pdf: Arc::new(PrintPdfEngine),
            validator: Arc::new(DefaultValidator),
        }
    }

    /// Replaces the PDF engine.
    pub fn with_pdf_engine(mut self, engine: Arc<dyn PdfEngine>) -> Self {
        self.pdf = engine;
        self
    }

    /// Replaces the payload validator.
    pub fn with_validator(mut self, validator: Arc<dyn PayloadValidator>) -> Self {
        self.validator = validator;
        self
    }
}
