pub mod db;
pub mod identity;
pub mod payment_gateway;
pub mod question_llm;

pub use db::DbAdapter;
pub use identity::HttpIdentityProvider;
pub use payment_gateway::MidtransGateway;
pub use question_llm::OpenAiQuestionAdapter;
