//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use quiz_platform_core::{
    ports::{DatabaseService, IdentityProvider, PaymentGateway, QuestionGenerationService},
    AuditService, PaymentService, PaymentSettings, QuizService, QuizSessionService, ShopService,
    UserService,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub users: UserService,
    pub payments: PaymentService,
    pub quizzes: QuizService,
    pub sessions: QuizSessionService,
    pub shop: ShopService,
    pub audit: AuditService,
}

impl AppState {
    /// Wires every core service to the given adapters.
    pub fn new(
        config: Arc<Config>,
        db: Arc<dyn DatabaseService>,
        identity: Arc<dyn IdentityProvider>,
        gateway: Arc<dyn PaymentGateway>,
        generator: Option<Arc<dyn QuestionGenerationService>>,
    ) -> Self {
        let settings = PaymentSettings {
            server_key: config.midtrans_server_key.clone(),
            expiry_minutes: config.payment_expiry_minutes,
        };
        Self {
            users: UserService::new(db.clone(), identity),
            payments: PaymentService::new(db.clone(), gateway, settings),
            quizzes: QuizService::new(db.clone(), generator),
            sessions: QuizSessionService::new(db.clone()),
            shop: ShopService::new(db.clone()),
            audit: AuditService::new(db),
            config,
        }
    }
}
