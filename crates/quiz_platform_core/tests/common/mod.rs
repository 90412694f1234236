#![allow(dead_code)]

use async_trait::async_trait;
use quiz_platform_core::domain::{
    CheckoutRequest, CheckoutToken, Difficulty, GatewayStatus, GeneratedQuestion,
    GenerationParams, Identity, NewAvatar, NewUser, PaymentNotification, QuestionDraft,
    QuestionKind, Quiz, QuizDraft, Rarity, Role, Transaction, User, Visibility,
};
use quiz_platform_core::payments::notification_signature;
use quiz_platform_core::ports::{
    DatabaseService, IdentityProvider, PaymentGateway, PortError, PortResult,
    QuestionGenerationService,
};
use quiz_platform_core::{
    AuditService, InMemoryStore, PaymentService, PaymentSettings, QuizService,
    QuizSessionService, ShopService, UserService,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SERVER_KEY: &str = "test-server-key";

//=========================================================================================
// Fake collaborators
//=========================================================================================

/// Scripted payment gateway. Statuses are set per order with [`FakeGateway::report`];
/// unknown orders are reported as still pending.
#[derive(Default)]
pub struct FakeGateway {
    pub fail_checkout: AtomicBool,
    pub fail_status: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub checkouts: AtomicUsize,
    pub polls: AtomicUsize,
    pub cancels: AtomicUsize,
    statuses: Mutex<HashMap<String, GatewayStatus>>,
}

impl FakeGateway {
    pub fn report(&self, status: GatewayStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(status.order_id.clone(), status);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> PortResult<CheckoutToken> {
        if self.fail_checkout.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("gateway returned 503".to_string()));
        }
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        Ok(CheckoutToken {
            token: format!("snap-{}", request.order_id),
            redirect_url: format!("https://checkout.test/{}", request.order_id),
        })
    }

    async fn fetch_status(&self, order_id: &str) -> PortResult<GatewayStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("gateway timed out".to_string()));
        }
        let statuses = self.statuses.lock().unwrap();
        Ok(statuses
            .get(order_id)
            .cloned()
            .unwrap_or_else(|| gateway_status(order_id, "pending", "0.00")))
    }

    async fn cancel(&self, _order_id: &str) -> PortResult<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("gateway returned 500".to_string()));
        }
        Ok(())
    }
}

/// Token table standing in for the identity provider.
#[derive(Default)]
pub struct FakeIdentity {
    tokens: Mutex<HashMap<String, Identity>>,
    pub role_claims: Mutex<Vec<(String, Role)>>,
    pub fail_role_sync: AtomicBool,
}

impl FakeIdentity {
    pub fn add(&self, token: &str, external_id: &str, name: &str) -> Identity {
        let identity = Identity {
            external_id: external_id.to_string(),
            name: name.to_string(),
            email: Some(format!("{}@example.test", name.to_lowercase())),
            role: None,
        };
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), identity.clone());
        identity
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn verify_token(&self, bearer: &str) -> PortResult<Identity> {
        self.tokens
            .lock()
            .unwrap()
            .get(bearer)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }

    async fn update_role_claim(&self, external_id: &str, role: Role) -> PortResult<()> {
        if self.fail_role_sync.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("identity provider unavailable".to_string()));
        }
        self.role_claims
            .lock()
            .unwrap()
            .push((external_id.to_string(), role));
        Ok(())
    }
}

pub struct FakeGenerator {
    pub output: GeneratedQuestion,
}

#[async_trait]
impl QuestionGenerationService for FakeGenerator {
    async fn generate_question(&self, params: &GenerationParams) -> PortResult<GeneratedQuestion> {
        let mut output = self.output.clone();
        output.question = format!("{} ({})", output.question, params.topic);
        Ok(output)
    }
}

//=========================================================================================
// Platform fixture
//=========================================================================================

pub struct Platform {
    pub store: InMemoryStore,
    pub gateway: Arc<FakeGateway>,
    pub identity: Arc<FakeIdentity>,
    pub users: UserService,
    pub payments: PaymentService,
    pub quizzes: QuizService,
    pub sessions: QuizSessionService,
    pub shop: ShopService,
    pub audit: AuditService,
}

impl Platform {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_generator(output: GeneratedQuestion) -> Self {
        Self::build(Some(Arc::new(FakeGenerator { output })))
    }

    fn build(generator: Option<Arc<dyn QuestionGenerationService>>) -> Self {
        let store = InMemoryStore::new();
        let db: Arc<dyn DatabaseService> = Arc::new(store.clone());
        let gateway = Arc::new(FakeGateway::default());
        let identity = Arc::new(FakeIdentity::default());
        let settings = PaymentSettings {
            server_key: SERVER_KEY.to_string(),
            expiry_minutes: 60,
        };
        Self {
            users: UserService::new(db.clone(), identity.clone()),
            payments: PaymentService::new(db.clone(), gateway.clone(), settings),
            quizzes: QuizService::new(db.clone(), generator),
            sessions: QuizSessionService::new(db.clone()),
            shop: ShopService::new(db.clone()),
            audit: AuditService::new(db),
            store,
            gateway,
            identity,
        }
    }

    /// Registers `name` through the identity provider; the bearer token is
    /// `token-<name>`.
    pub async fn register(&self, name: &str, role: Role) -> User {
        let token = format!("token-{}", name);
        self.identity.add(&token, &format!("ext-{}", name), name);
        let identity = self.users.identify(&token).await.unwrap();
        self.users.register_user(&identity, role).await.unwrap()
    }

    /// Admins cannot self-register, so they are inserted directly.
    pub async fn admin(&self, name: &str) -> User {
        let token = format!("token-{}", name);
        let identity = self.identity.add(&token, &format!("ext-{}", name), name);
        self.store
            .create_user(NewUser {
                external_id: identity.external_id,
                name: name.to_string(),
                email: identity.email,
                role: Role::Admin,
                subscription_id: "SB001".to_string(),
            })
            .await
            .unwrap()
    }

    pub async fn store_transaction(&self, id: &str) -> Transaction {
        self.store.get_transaction(id).await.unwrap()
    }

    pub async fn avatar(&self, name: &str, price: Decimal) -> String {
        self.store
            .create_avatar(NewAvatar {
                name: name.to_string(),
                price,
                rarity: Rarity::Rare,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn quiz(&self, teacher: &User, title: &str) -> Quiz {
        self.quizzes
            .create_quiz(teacher, quiz_draft(title, None, Visibility::Public))
            .await
            .unwrap()
    }

    /// Adds a multiple-choice question and returns its id.
    pub async fn multiple(&self, teacher: &User, quiz_id: &str, text: &str, correct: &str, wrong: &[&str]) -> String {
        self.quizzes
            .add_question(teacher, quiz_id, multiple_draft(text, correct, wrong))
            .await
            .unwrap()
            .id
    }

    /// Adds a true/false question and returns its id.
    pub async fn boolean(&self, teacher: &User, quiz_id: &str, text: &str, correct: bool) -> String {
        let draft = QuestionDraft {
            kind: QuestionKind::Boolean,
            difficulty: Difficulty::Easy,
            text: text.to_string(),
            correct_answer: if correct { "True" } else { "False" }.to_string(),
            incorrect_answers: vec![],
            explanation: None,
        };
        self.quizzes
            .add_question(teacher, quiz_id, draft)
            .await
            .unwrap()
            .id
    }
}

pub fn quiz_draft(title: &str, code: Option<&str>, visibility: Visibility) -> QuizDraft {
    QuizDraft {
        title: title.to_string(),
        description: "A quiz".to_string(),
        category: "general".to_string(),
        code: code.map(str::to_string),
        visibility,
    }
}

pub fn multiple_draft(text: &str, correct: &str, wrong: &[&str]) -> QuestionDraft {
    QuestionDraft {
        kind: QuestionKind::Multiple,
        difficulty: Difficulty::Medium,
        text: text.to_string(),
        correct_answer: correct.to_string(),
        incorrect_answers: wrong.iter().map(|s| s.to_string()).collect(),
        explanation: None,
    }
}

pub fn gateway_status(order_id: &str, transaction_status: &str, gross_amount: &str) -> GatewayStatus {
    let status_code = match transaction_status {
        "capture" | "settlement" => "200",
        "pending" => "201",
        _ => "202",
    };
    GatewayStatus {
        order_id: order_id.to_string(),
        status_code: status_code.to_string(),
        gross_amount: gross_amount.to_string(),
        transaction_status: transaction_status.to_string(),
        payment_type: Some("bank_transfer".to_string()),
        fraud_status: None,
    }
}

/// A notification signed with `key`.
pub fn notification(status: GatewayStatus, key: &str) -> PaymentNotification {
    let signature_key = notification_signature(
        &status.order_id,
        &status.status_code,
        &status.gross_amount,
        key,
    );
    PaymentNotification { status, signature_key }
}
