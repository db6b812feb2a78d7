// src/services/mod.rs
//
// Shared services module containing the identity broker's business
// logic, free of HTTP types.

pub mod authz;
pub mod callback;
pub mod identity;
pub mod login;
pub mod session;
pub mod token;
pub mod users;
pub mod wechat;

// Re-export commonly used types for convenience
pub use identity::IdentityService;
pub use login::LoginService;
pub use session::SessionService;
pub use wechat::WeChatService;
