pub mod access;
pub mod audit;
pub mod domain;
pub mod error;
pub mod ids;
pub mod in_memory;
pub mod payments;
pub mod ports;
pub mod quizzes;
pub mod sessions;
pub mod shop;
pub mod users;

pub use audit::AuditService;
pub use error::{CoreError, CoreResult};
pub use in_memory::InMemoryStore;
pub use payments::{PaymentService, PaymentSettings};
pub use ports::{
    DatabaseService, IdentityProvider, PaymentGateway, PortError, PortResult,
    QuestionGenerationService,
};
pub use quizzes::QuizService;
pub use sessions::QuizSessionService;
pub use shop::ShopService;
pub use users::UserService;
