pub mod node_session;
pub mod router;

pub use node_session::Entity as NodeSession;
pub use router::Entity as Router;
